//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! simulation scenario. A scenario consists of:
//!
//! - [`EngineConfig`]        – execution strategy, integrator, barriers, workers
//! - [`ParametersConfig`]    – time step and default step count
//! - bodies                  – inline [`BodyRecord`]s and/or a JSON body file
//! - [`TestParticlesConfig`] – optional cloud of generated massless particles
//! - [`BenchmarkConfig`]     – optional accuracy benchmark setup
//! - [`ScenarioConfig`]      – top-level wrapper
//!
//! # YAML format
//! ```yaml
//! engine:
//!   strategy: partitioned   # serial | parallel | partitioned | halved | locked | stepped
//!   integrator: euler       # euler | rk4
//!   barrier: full           # full | slim
//!   workers: 4              # optional, defaults to available cores
//!   proximity_guard: false
//!
//! parameters:
//!   time_step: 60.0         # seconds per step
//!   steps: 1000000
//!
//! bodies:
//!   - name: Sun
//!     mass: 1.9885e30
//!     radius: 695700000
//!     position: [0, 0]
//!     velocity: [0.0, 0.0]
//!   - name: Earth
//!     mass: 5.972e24
//!     radius: 6371000
//!     position: [149600000000, 0]
//!     velocity: [0.0, 29780.0]
//! ```
//!
//! Body sets are persisted as JSON arrays of the same records.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::simulation::engine::{BarrierMode, Engine, IntegratorKind, Strategy};
use crate::simulation::error::SimError;
use crate::simulation::forces::ProximityGuard;
use crate::simulation::params::Parameters;
use crate::simulation::states::BodyRecord;

/// Which strategy advances the simulation
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyConfig {
    Serial,
    Parallel,
    Partitioned,
    Halved,
    Locked,
    Stepped,
}

/// Which integrator method used by the engine
/// integrator: "euler"` or `integrator: "rk4"
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegratorConfig {
    #[serde(rename = "euler")] // semi-implicit Euler, one force evaluation per step
    #[default]
    Euler,

    #[serde(rename = "rk4")] // classical Runge-Kutta, four force evaluations per step
    Rk4,
}

impl From<IntegratorConfig> for IntegratorKind {
    fn from(cfg: IntegratorConfig) -> Self {
        match cfg {
            IntegratorConfig::Euler => IntegratorKind::Euler,
            IntegratorConfig::Rk4 => IntegratorKind::Rk4,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BarrierConfig {
    #[default]
    Full,
    Slim,
}

impl From<BarrierConfig> for BarrierMode {
    fn from(cfg: BarrierConfig) -> Self {
        match cfg {
            BarrierConfig::Full => BarrierMode::Full,
            BarrierConfig::Slim => BarrierMode::Slim,
        }
    }
}

impl StrategyConfig {
    pub fn to_strategy(self, steps_per_cycle: u32) -> Strategy {
        match self {
            StrategyConfig::Serial => Strategy::Serial,
            StrategyConfig::Parallel => Strategy::Parallel,
            StrategyConfig::Partitioned => Strategy::Partitioned,
            StrategyConfig::Halved => Strategy::Halved,
            StrategyConfig::Locked => Strategy::Locked,
            StrategyConfig::Stepped => Strategy::Stepped { steps_per_cycle },
        }
    }
}

fn default_steps_per_cycle() -> u32 {
    100
}

/// High-level engine configuration
#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub integrator: IntegratorConfig,
    #[serde(default)]
    pub barrier: BarrierConfig,
    pub workers: Option<usize>, // None -> one per core
    #[serde(default)]
    pub proximity_guard: bool, // stop accumulating force once two bodies touch
    #[serde(default = "default_steps_per_cycle")]
    pub steps_per_cycle: u32, // stepped strategy only
}

impl EngineConfig {
    pub fn strategy(&self) -> Strategy {
        self.strategy.to_strategy(self.steps_per_cycle)
    }

    pub fn to_engine(&self) -> Engine {
        Engine {
            strategy: self.strategy(),
            integrator: self.integrator.into(),
            barrier: self.barrier.into(),
            workers: self.workers,
            guard: if self.proximity_guard {
                ProximityGuard::AbortRemaining
            } else {
                ProximityGuard::Off
            },
        }
    }
}

/// Global numerical parameters for a scenario
#[derive(Deserialize, Debug, Clone)]
pub struct ParametersConfig {
    pub time_step: f64, // seconds per step
    pub steps: u64,     // steps for a `run`
}

impl From<&ParametersConfig> for Parameters {
    fn from(cfg: &ParametersConfig) -> Self {
        Parameters {
            time_step: cfg.time_step,
            steps: cfg.steps,
        }
    }
}

/// Generated massless bodies on near-circular orbits around the origin
#[derive(Deserialize, Debug, Clone)]
pub struct TestParticlesConfig {
    pub count: usize,
    pub seed: u64,             // runs are reproducible for a given seed
    pub central_mass: f64,     // mass the orbital speed is computed against
    pub min_distance: i64,     // m
    pub max_distance: i64,     // m
    #[serde(default)]
    pub speed_variance: f64,   // m/s, uniform +/- on top of the orbital speed
    #[serde(default)]
    pub angle_variance: f64,   // rad, deviation from the tangential direction
    #[serde(default)]
    pub radius: i64,
}

/// One literal reference distance the benchmark compares against
#[derive(Deserialize, Debug, Clone)]
pub struct ReferencePair {
    pub from: String,
    pub to: String,
    pub distance: i64, // m
}

/// One strategy/integrator combination to benchmark
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct BenchmarkRunConfig {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub integrator: IntegratorConfig,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("accuracy_benchmark.log")
}

/// Accuracy benchmark setup
#[derive(Deserialize, Debug, Clone)]
pub struct BenchmarkConfig {
    pub euler_steps: u64,
    pub euler_time_step: f64,
    pub rk4_steps: u64,
    pub rk4_time_step: f64,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub runs: Vec<BenchmarkRunConfig>, // empty -> every strategy with euler, partitioned with rk4
    pub references: Vec<ReferencePair>,
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug)]
pub struct ScenarioConfig {
    pub engine: EngineConfig,
    pub parameters: ParametersConfig,
    #[serde(default)]
    pub bodies: Vec<BodyRecord>,
    pub bodies_file: Option<PathBuf>, // JSON body set, relative to the scenario file
    pub test_particles: Option<TestParticlesConfig>,
    pub benchmark: Option<BenchmarkConfig>,
}

impl ScenarioConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, SimError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, SimError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_yaml::from_reader(reader)?)
}

pub fn bodies_to_json(bodies: &[BodyRecord]) -> Result<String, SimError> {
    Ok(serde_json::to_string_pretty(bodies)?)
}

pub fn bodies_from_json(text: &str) -> Result<Vec<BodyRecord>, SimError> {
    Ok(serde_json::from_str(text)?)
}

pub fn load_bodies(path: &Path) -> Result<Vec<BodyRecord>, SimError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn save_bodies(path: &Path, bodies: &[BodyRecord]) -> Result<(), SimError> {
    let mut file = File::create(path)?;
    file.write_all(bodies_to_json(bodies)?.as_bytes())?;
    Ok(())
}
