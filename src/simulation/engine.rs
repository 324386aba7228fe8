//! High-level runtime engine settings
//!
//! Selects the execution strategy, integrator, barrier mode, worker count and
//! force-law guard used when building and running a `Simulation`

use std::fmt;

use super::error::SimError;
use super::forces::ProximityGuard;
use super::partition::PartitionScheme;

/// How steps are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// calling thread, combined Euler form
    Serial,
    /// rayon data-parallel, two parallel phases per step
    Parallel,
    /// one OS thread per worker, round-robin bodies
    Partitioned,
    /// Newton's third law: each pair computed once, zig-zag balanced
    Halved,
    /// partitioned, commit phase behind a per-worker mutex
    Locked,
    /// partitioned, parks after `steps_per_cycle` steps until `tick`
    Stepped { steps_per_cycle: u32 },
}

impl Strategy {
    /// Strategies that run on dedicated worker threads
    pub fn is_threaded(self) -> bool {
        !matches!(self, Strategy::Serial | Strategy::Parallel)
    }

    pub fn partition_scheme(self) -> PartitionScheme {
        match self {
            Strategy::Halved => PartitionScheme::ZigZag,
            _ => PartitionScheme::RoundRobin,
        }
    }

    pub fn locks_commit(self) -> bool {
        matches!(self, Strategy::Locked)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Serial => write!(f, "serial"),
            Strategy::Parallel => write!(f, "parallel"),
            Strategy::Partitioned => write!(f, "partitioned"),
            Strategy::Halved => write!(f, "halved"),
            Strategy::Locked => write!(f, "locked"),
            Strategy::Stepped { steps_per_cycle } => write!(f, "stepped({steps_per_cycle})"),
        }
    }
}

/// Integration scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegratorKind {
    /// semi-implicit Euler
    #[default]
    Euler,
    /// classical 4th-order Runge-Kutta
    Rk4,
}

impl fmt::Display for IntegratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegratorKind::Euler => write!(f, "euler"),
            IntegratorKind::Rk4 => write!(f, "rk4"),
        }
    }
}

/// Barriers per step for threaded strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarrierMode {
    /// read phase and commit phase fully separated
    #[default]
    Full,
    /// no barrier after commit; the next read phase may see a few stale positions
    Slim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    pub strategy: Strategy,
    pub integrator: IntegratorKind,
    pub barrier: BarrierMode,
    pub workers: Option<usize>, // None -> available parallelism
    pub guard: ProximityGuard,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            strategy: Strategy::Serial,
            integrator: IntegratorKind::Euler,
            barrier: BarrierMode::Full,
            workers: None,
            guard: ProximityGuard::Off,
        }
    }
}

impl Engine {
    pub fn new(strategy: Strategy, integrator: IntegratorKind) -> Self {
        Self {
            strategy,
            integrator,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_barrier(mut self, barrier: BarrierMode) -> Self {
        self.barrier = barrier;
        self
    }

    pub fn with_guard(mut self, guard: ProximityGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Barrier mode actually used; cycle-gated runs always fully separate phases
    pub fn effective_barrier(&self) -> BarrierMode {
        match self.strategy {
            Strategy::Stepped { .. } => BarrierMode::Full,
            _ => self.barrier,
        }
    }

    /// Reject combinations the engine cannot run
    pub fn validate(&self) -> Result<(), SimError> {
        if self.workers == Some(0) {
            return Err(SimError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        match self.strategy {
            Strategy::Halved if self.integrator == IntegratorKind::Rk4 => Err(SimError::Unsupported(
                "the halved strategy only integrates with euler".to_string(),
            )),
            Strategy::Halved if self.guard != ProximityGuard::Off => Err(SimError::Unsupported(
                "the halved strategy has no proximity guard".to_string(),
            )),
            Strategy::Stepped { steps_per_cycle: 0 } => Err(SimError::InvalidConfig(
                "steps_per_cycle must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
