//! Error taxonomy of the simulation library
//!
//! Configuration problems fail immediately and are never retried.
//! Numerical singularities are not represented here: they are prevented by
//! peer-set construction, not caught.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("body set is empty")]
    EmptyBodySet,

    #[error("invalid body `{name}`: {reason}")]
    InvalidBody { name: String, reason: String },

    #[error("duplicate body name `{0}`")]
    DuplicateBody(String),

    #[error("no body named `{0}`")]
    UnknownBody(String),

    #[error("workers are running; stop them before changing the body set")]
    RunActive,

    #[error("no workers are running")]
    NoActiveRun,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
