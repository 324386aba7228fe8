//! Fixed-step time integrators for the N-body system
//!
//! Every integrator is split into a read phase and a commit phase:
//! - the read phase only reads shared positions and writes the body's own
//!   velocity / staging slots,
//! - the commit phase only writes the body's own position (and velocity).
//!
//! Worker threads put a barrier between the two. The whole-system helpers at
//! the bottom drive the same per-body functions on one thread.

use super::forces::{sum_pair_forces, Acceleration};
use super::states::{wrapping_add, IVec2, NVec2, System};

/// Round a displacement to whole meters, ties to even
#[inline]
fn to_meters(d: NVec2) -> IVec2 {
    IVec2::new(d.x.round_ties_even() as i64, d.y.round_ties_even() as i64)
}

// =========================================================================================
// Semi-implicit Euler
// =========================================================================================

/// Read phase: a = F(x), v += a * dt
pub fn compute_velocity<A: Acceleration + ?Sized>(sys: &System, index: usize, law: &A) {
    let body = &sys.bodies[index];
    let acc = law.acceleration(sys, index, NVec2::zeros());
    body.acceleration.store(acc);
    body.velocity.store(body.velocity.load() + acc * sys.time_step);
}

/// Commit phase: x += round(v * dt)
pub fn commit_position(sys: &System, index: usize) {
    let body = &sys.bodies[index];
    let delta = to_meters(body.velocity.load() * sys.time_step);
    body.position.store(wrapping_add(body.position.load(), delta));
}

/// Both Euler phases back to back, for single-threaded use only
pub fn step_combined<A: Acceleration + ?Sized>(sys: &System, index: usize, law: &A) {
    compute_velocity(sys, index, law);
    commit_position(sys, index);
}

// =========================================================================================
// Symmetric (halved) Euler commit
// =========================================================================================

/// Commit phase of the halved strategy: a = sum(row) / m, then the Euler update
///
/// The pair forces must have been fully written by every worker before this
/// runs (first barrier).
pub fn commit_symmetric(sys: &System, index: usize) {
    let body = &sys.bodies[index];
    let acc = sum_pair_forces(sys, index) / body.mass;
    body.acceleration.store(acc);
    let v = body.velocity.load() + acc * sys.time_step;
    body.velocity.store(v);
    body.position.store(wrapping_add(body.position.load(), to_meters(v * sys.time_step)));
}

// =========================================================================================
// Classical Runge-Kutta (RK4)
// =========================================================================================

/// Read phase: evaluate the four stages and stage the weighted deltas
///
/// Only this body is displaced between stages; all peers stay at their
/// committed positions until every body has been staged.
pub fn rk4_stage<A: Acceleration + ?Sized>(sys: &System, index: usize, law: &A) {
    let body = &sys.bodies[index];
    let dt = sys.time_step;
    let half_dt = 0.5 * dt;
    let v0 = body.velocity.load();

    // k1 at the committed state
    let k1v = law.acceleration(sys, index, NVec2::zeros());
    let k1x = v0;

    // k2, k3 at the midpoint
    let k2v = law.acceleration(sys, index, k1x * half_dt);
    let k2x = v0 + k1v * half_dt;

    let k3v = law.acceleration(sys, index, k2x * half_dt);
    let k3x = v0 + k2v * half_dt;

    // k4 at the end of the step
    let k4v = law.acceleration(sys, index, k3x * dt);
    let k4x = v0 + k3v * dt;

    let sixth = dt / 6.0;
    body.acceleration.store(k1v);
    body.pending_position.store((k1x + 2.0 * k2x + 2.0 * k3x + k4x) * sixth);
    body.pending_velocity.store((k1v + 2.0 * k2v + 2.0 * k3v + k4v) * sixth);
}

/// Commit phase: apply the staged RK4 deltas
pub fn commit_rk4(sys: &System, index: usize) {
    let body = &sys.bodies[index];
    body.velocity.store(body.velocity.load() + body.pending_velocity.load());
    body.position
        .store(wrapping_add(body.position.load(), to_meters(body.pending_position.load())));
}

// =========================================================================================
// Whole-system helpers (single thread)
// =========================================================================================

/// Advance every body one step with the combined Euler form, in body order
///
/// Later bodies see the already-moved positions of earlier ones.
pub fn euler_integrator<A: Acceleration + ?Sized>(sys: &System, law: &A) {
    for i in 0..sys.bodies.len() {
        step_combined(sys, i, law);
    }
}

/// Advance every body one RK4 step: stage everyone, then commit everyone
pub fn rk4_integrator<A: Acceleration + ?Sized>(sys: &System, law: &A) {
    let n = sys.bodies.len();
    for i in 0..n {
        rk4_stage(sys, i, law);
    }
    for i in 0..n {
        commit_rk4(sys, i);
    }
}
