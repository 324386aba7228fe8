//! Core state types for the N-body simulation.
//!
//! Defines the body arena shared by every execution strategy:
//! - `Body`       one physical entity, addressed by its index in `System`
//! - `System`     the ordered body collection plus derived caches
//! - `BodyRecord` the plain serializable snapshot of a body
//!
//! Positions are fixed-point integers in meters, velocities and accelerations
//! are `f64`. Mutable state lives in relaxed atomics so that worker threads can
//! share one `System` by index; ordering between phases comes from the step
//! barrier, never from the atomics themselves.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use super::error::SimError;
use super::params::G;

pub type NVec2 = Vector2<f64>;
pub type IVec2 = Vector2<i64>;

/// `f64` stored as its bit pattern in an `AtomicU64`
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed)
    }
}

/// Two-component atomic float vector
#[derive(Debug, Default)]
pub struct AtomicVec2([AtomicF64; 2]);

impl AtomicVec2 {
    pub fn new(v: NVec2) -> Self {
        Self([AtomicF64::new(v.x), AtomicF64::new(v.y)])
    }

    #[inline]
    pub fn load(&self) -> NVec2 {
        NVec2::new(self.0[0].load(), self.0[1].load())
    }

    #[inline]
    pub fn store(&self, v: NVec2) {
        self.0[0].store(v.x);
        self.0[1].store(v.y);
    }
}

/// Two-component atomic integer vector, fixed-point meters
#[derive(Debug, Default)]
pub struct AtomicIVec2([AtomicI64; 2]);

impl AtomicIVec2 {
    pub fn new(v: IVec2) -> Self {
        Self([AtomicI64::new(v.x), AtomicI64::new(v.y)])
    }

    #[inline]
    pub fn load(&self) -> IVec2 {
        IVec2::new(
            self.0[0].load(Ordering::Relaxed),
            self.0[1].load(Ordering::Relaxed),
        )
    }

    #[inline]
    pub fn store(&self, v: IVec2) {
        self.0[0].store(v.x, Ordering::Relaxed);
        self.0[1].store(v.y, Ordering::Relaxed);
    }
}

fn default_massive() -> bool {
    true
}

/// Serializable body snapshot, used to build and to persist a `System`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BodyRecord {
    pub name: String,
    pub mass: f64, // kg
    #[serde(default = "default_massive")]
    pub is_massive: bool, // false -> test particle, feels gravity but exerts none
    #[serde(default)]
    pub radius: i64, // m, only used by the proximity guard
    pub position: [i64; 2], // m
    pub velocity: [f64; 2], // m/s
}

impl BodyRecord {
    pub fn new(name: &str, mass: f64, is_massive: bool, radius: i64, position: [i64; 2], velocity: [f64; 2]) -> Self {
        Self {
            name: name.to_string(),
            mass,
            is_massive,
            radius,
            position,
            velocity,
        }
    }

    /// Re-express a record given relative to `parent` in absolute coordinates
    pub fn relative_to(mut self, parent: &BodyRecord) -> Self {
        self.position[0] += parent.position[0];
        self.position[1] += parent.position[1];
        self.velocity[0] += parent.velocity[0];
        self.velocity[1] += parent.velocity[1];
        self
    }

    fn validate(&self) -> Result<(), SimError> {
        let invalid = |reason: &str| SimError::InvalidBody {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if !self.mass.is_finite() || self.mass <= 0.0 {
            return Err(invalid("mass must be finite and positive"));
        }
        if self.radius < 0 {
            return Err(invalid("radius must not be negative"));
        }
        if !self.velocity.iter().all(|v| v.is_finite()) {
            return Err(invalid("velocity must be finite"));
        }
        Ok(())
    }
}

/// One body of the arena
///
/// Immutable identity (name, mass, radius) sits next to the mutable state.
/// `peers` and `worker_index` belong to the current partition and are
/// rewritten by the partitioner.
#[derive(Debug)]
pub struct Body {
    pub name: String,
    pub mass: f64,
    pub std_grav_param: f64, // G * mass, cached at construction
    pub is_massive: bool,
    pub radius: i64,
    pub position: AtomicIVec2,
    pub velocity: AtomicVec2,
    pub acceleration: AtomicVec2, // scratch, recomputed every step
    // RK4 staged deltas, committed after every body finished its stages
    pub pending_position: AtomicVec2,
    pub pending_velocity: AtomicVec2,
    pub peers: Vec<usize>,
    pub worker_index: Option<usize>, // slot in the body array, set by the partitioner
}

impl Body {
    pub fn from_record(rec: &BodyRecord) -> Self {
        Self {
            name: rec.name.clone(),
            mass: rec.mass,
            std_grav_param: G * rec.mass,
            is_massive: rec.is_massive,
            radius: rec.radius,
            position: AtomicIVec2::new(IVec2::new(rec.position[0], rec.position[1])),
            velocity: AtomicVec2::new(NVec2::new(rec.velocity[0], rec.velocity[1])),
            acceleration: AtomicVec2::default(),
            pending_position: AtomicVec2::default(),
            pending_velocity: AtomicVec2::default(),
            peers: Vec::new(),
            worker_index: None,
        }
    }

    pub fn to_record(&self) -> BodyRecord {
        let p = self.position.load();
        let v = self.velocity.load();
        BodyRecord {
            name: self.name.clone(),
            mass: self.mass,
            is_massive: self.is_massive,
            radius: self.radius,
            position: [p.x, p.y],
            velocity: [v.x, v.y],
        }
    }
}

/// Which peer sets are currently materialized on the bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerScheme {
    /// every massive body except self
    Full,
    /// higher-indexed bodies only, for Newton's-third-law force writes
    Tail,
}

/// Pairwise caches of the symmetric ("halved") strategy, `n * n` row-major
#[derive(Debug)]
pub struct PairCache {
    pub gmm: Vec<f64>,           // G * m_i * m_j
    pub forces: Vec<AtomicVec2>, // forces[i * n + j]: force on i exerted by j
}

impl PairCache {
    fn build(bodies: &[Body]) -> Self {
        let n = bodies.len();
        let mut gmm = Vec::with_capacity(n * n);
        for bi in bodies {
            for bj in bodies {
                gmm.push(G * bi.mass * bj.mass);
            }
        }
        let forces = (0..n * n).map(|_| AtomicVec2::default()).collect();
        Self { gmm, forces }
    }
}

/// The ordered body collection and its time step
#[derive(Debug)]
pub struct System {
    pub bodies: Vec<Body>,
    pub time_step: f64, // seconds per integration step
    pub(crate) peer_scheme: Option<PeerScheme>,
    pub(crate) pairs: Option<PairCache>,
}

impl System {
    /// Build a system from records; rejects empty sets, duplicate names and bad bodies
    pub fn from_records(records: &[BodyRecord], time_step: f64) -> Result<Self, SimError> {
        if records.is_empty() {
            return Err(SimError::EmptyBodySet);
        }
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "time step must be finite and positive, got {time_step}"
            )));
        }
        let mut seen = HashSet::with_capacity(records.len());
        for rec in records {
            rec.validate()?;
            if !seen.insert(rec.name.as_str()) {
                return Err(SimError::DuplicateBody(rec.name.clone()));
            }
        }

        let mut system = Self {
            bodies: records.iter().map(Body::from_record).collect(),
            time_step,
            peer_scheme: None,
            pairs: None,
        };
        system.assign_peers(PeerScheme::Full);
        Ok(system)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Rebuild every body's peer set for `scheme`
    ///
    /// Self is never a peer. The pairwise cache is only allocated for
    /// `PeerScheme::Tail`, it is `n * n` and unused by every other strategy.
    pub fn assign_peers(&mut self, scheme: PeerScheme) {
        if self.peer_scheme == Some(scheme) {
            return;
        }
        let massive: Vec<bool> = self.bodies.iter().map(|b| b.is_massive).collect();
        let n = self.bodies.len();

        for (i, body) in self.bodies.iter_mut().enumerate() {
            body.peers = match scheme {
                PeerScheme::Full => (0..n).filter(|&j| j != i && massive[j]).collect(),
                // a pair is only worth computing if one side pulls the other
                PeerScheme::Tail => (i + 1..n).filter(|&j| massive[i] || massive[j]).collect(),
            };
        }

        if scheme == PeerScheme::Tail && self.pairs.is_none() {
            self.pairs = Some(PairCache::build(&self.bodies));
        }
        self.peer_scheme = Some(scheme);
    }

    pub fn peer_scheme(&self) -> Option<PeerScheme> {
        self.peer_scheme
    }

    pub fn index_of(&self, name: &str) -> Result<usize, SimError> {
        self.bodies
            .iter()
            .position(|b| b.name == name)
            .ok_or_else(|| SimError::UnknownBody(name.to_string()))
    }

    pub fn select(&self, name: &str) -> Result<&Body, SimError> {
        self.index_of(name).map(|i| &self.bodies[i])
    }

    pub fn positions(&self) -> Vec<IVec2> {
        self.bodies.iter().map(|b| b.position.load()).collect()
    }

    pub fn records(&self) -> Vec<BodyRecord> {
        self.bodies.iter().map(Body::to_record).collect()
    }
}

/// `p + d` in fixed point; a runaway body wraps around instead of panicking
#[inline]
pub fn wrapping_add(p: IVec2, d: IVec2) -> IVec2 {
    IVec2::new(p.x.wrapping_add(d.x), p.y.wrapping_add(d.y))
}

/// `a - b` in fixed point, wrapping like [`wrapping_add`]
#[inline]
pub fn wrapping_sub(a: IVec2, b: IVec2) -> IVec2 {
    IVec2::new(a.x.wrapping_sub(b.x), a.y.wrapping_sub(b.y))
}

/// Euclidean distance between two fixed-point positions, truncated to whole meters
pub fn distance(a: IVec2, b: IVec2) -> i64 {
    let dx = b.x as f64 - a.x as f64;
    let dy = b.y as f64 - a.y as f64;
    (dx * dx + dy * dy).sqrt() as i64
}
