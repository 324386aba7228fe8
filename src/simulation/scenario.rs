//! Build fully-initialized simulation scenarios from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces a runtime bundle
//! (`Scenario`) containing:
//! - engine settings (`Engine`)
//! - numerical parameters (`Parameters`)
//! - the initial body set, kept serialized so runs can be reset from it
//! - the optional benchmark setup
//!
//! Also hosts the polar helpers used to place bodies on orbits and the seeded
//! generator for clouds of massless test particles.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::path::Path;

use log::debug;

use crate::configuration::config::{load_bodies, BenchmarkConfig, ScenarioConfig, TestParticlesConfig};
use crate::simulation::engine::Engine;
use crate::simulation::error::SimError;
use crate::simulation::params::{Parameters, G};
use crate::simulation::scheduler::Simulation;
use crate::simulation::states::BodyRecord;

/// Runtime bundle constructed from a [`ScenarioConfig`]
#[derive(Debug, Clone)]
pub struct Scenario {
    pub engine: Engine,
    pub parameters: Parameters,
    pub bodies: Vec<BodyRecord>,
    pub benchmark: Option<BenchmarkConfig>,
}

impl Scenario {
    /// `base_dir` resolves a relative `bodies_file`
    pub fn build_scenario(cfg: ScenarioConfig, base_dir: &Path) -> Result<Self, SimError> {
        // Bodies: file first, then inline records, then generated particles
        let mut bodies = match &cfg.bodies_file {
            Some(file) => load_bodies(&base_dir.join(file))?,
            None => Vec::new(),
        };
        bodies.extend(cfg.bodies.iter().cloned());
        if let Some(particles) = &cfg.test_particles {
            bodies.extend(generate_test_particles(particles));
        }
        if bodies.is_empty() {
            return Err(SimError::EmptyBodySet);
        }

        let engine = cfg.engine.to_engine();
        engine.validate()?;
        let parameters = Parameters::from(&cfg.parameters);
        debug!(
            "scenario: {} bodies, {} / {}, dt = {}",
            bodies.len(),
            engine.strategy,
            engine.integrator,
            parameters.time_step
        );

        Ok(Self {
            engine,
            parameters,
            bodies,
            benchmark: cfg.benchmark,
        })
    }

    /// Fresh simulation at the scenario's initial state
    pub fn simulation(&self) -> Result<Simulation, SimError> {
        Simulation::new(&self.bodies, self.parameters, self.engine)
    }
}

// =========================================================================================
// Polar helpers
// =========================================================================================

/// Polar (distance, angle) to cartesian fixed-point coordinates
pub fn position_polar_to_cartesian(distance: i64, angle: f64) -> [i64; 2] {
    let d = distance as f64;
    [(d * angle.cos()) as i64, (d * angle.sin()) as i64]
}

/// Velocity of magnitude `speed`, perpendicular (counter-clockwise) to the
/// radius at `angle`, rotated further by `deviation`
pub fn velocity_polar_to_cartesian(speed: f64, angle: f64, deviation: f64) -> [f64; 2] {
    let heading = angle + FRAC_PI_2 + deviation;
    [speed * heading.cos(), speed * heading.sin()]
}

/// Circular orbital speed around a much heavier body
pub fn orbital_velocity(central_mass: f64, distance: i64) -> f64 {
    (G * central_mass / distance as f64).sqrt()
}

/// Approximate circular orbital speed for two bodies of comparable mass
pub fn orbital_velocity_pair(mass1: f64, mass2: f64, distance: i64) -> f64 {
    orbital_velocity(mass1, distance) + orbital_velocity(mass2, distance)
}

// =========================================================================================
// Test particles
// =========================================================================================

/// Massless particles on near-circular orbits around the origin
///
/// Deterministic for a given seed. Particles are named `particle-<n>`, have a
/// nominal mass of 1 kg and never pull on anything.
pub fn generate_test_particles(cfg: &TestParticlesConfig) -> Vec<BodyRecord> {
    let mut rng = fastrand::Rng::with_seed(cfg.seed);
    let (lo, hi) = if cfg.min_distance <= cfg.max_distance {
        (cfg.min_distance, cfg.max_distance)
    } else {
        (cfg.max_distance, cfg.min_distance)
    };

    (0..cfg.count)
        .map(|i| {
            let distance = rng.i64(lo.max(1)..=hi.max(1));
            let angle = rng.f64() * TAU;
            let jitter = (rng.f64() * 2.0 - 1.0) * cfg.speed_variance;
            let speed = orbital_velocity(cfg.central_mass, distance) + jitter;
            let deviation = rng.f64() * cfg.angle_variance;

            BodyRecord {
                name: format!("particle-{i}"),
                mass: 1.0,
                is_massive: false,
                radius: cfg.radius,
                position: position_polar_to_cartesian(distance, angle),
                velocity: velocity_polar_to_cartesian(speed, angle, deviation),
            }
        })
        .collect()
}
