//! Numerical and physical parameters for the simulation
//!
//! `Parameters` holds runtime settings:
//! - integration step size,
//! - default number of steps for run-to-completion

/// Gravitational constant, m^3 kg^-1 s^-2
pub const G: f64 = 6.6743015e-11;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub time_step: f64, // seconds per step
    pub steps: u64,     // step count used when a run is not given one explicitly
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            time_step: 60.0,
            steps: 1_000,
        }
    }
}
