pub mod simulation;
pub mod configuration;
pub mod benchmark;

pub use simulation::states::{distance, Body, BodyRecord, System, NVec2, IVec2, PeerScheme};
pub use simulation::error::SimError;
pub use simulation::params::{Parameters, G};
pub use simulation::forces::{Acceleration, NewtonianGravity, ProximityGuard};
pub use simulation::integrator::{euler_integrator, rk4_integrator};
pub use simulation::engine::{BarrierMode, Engine, IntegratorKind, Strategy};
pub use simulation::partition::{partition, Assignment, PartitionScheme};
pub use simulation::scheduler::{CancellationToken, PauseGuard, RunReport, Simulation, StopCondition};
pub use simulation::scenario::{generate_test_particles, Scenario};

pub use configuration::config::{
    load_bodies, load_scenario, save_bodies, BenchmarkConfig, EngineConfig, IntegratorConfig, ParametersConfig,
    ScenarioConfig, StrategyConfig,
};

pub use benchmark::benchmark::{append_report, bench_strategies, run_accuracy_benchmark, AccuracyReport};
