//! Force / acceleration contributors for the n-body engine
//!
//! Defines the acceleration trait, direct Newtonian gravity over a body's
//! peer set (with an optional proximity guard), and the symmetric pair-force
//! writer used by the halved strategy.

use serde::Deserialize;

use crate::simulation::states::{wrapping_sub, NVec2, System};

/// Trait for acceleration sources operating on one body of a [`System`]
///
/// `offset` displaces the evaluated body from its committed position; peers
/// are always read at their committed positions. Euler passes zero, RK4 passes
/// its staged displacement.
pub trait Acceleration {
    fn acceleration(&self, sys: &System, index: usize, offset: NVec2) -> NVec2;
}

/// What to do when two bodies come within the sum of their radii
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProximityGuard {
    #[serde(rename = "off")]
    #[default]
    Off,
    /// stop accumulating the remaining peers of this body for this step
    #[serde(rename = "abort_remaining")]
    AbortRemaining,
}

/// Direct Newtonian gravity, no softening
///
/// Peer sets never contain the body itself, so `r2 == 0` can only happen for
/// two distinct bodies at the same spot. That case is not guarded and yields
/// non-finite values.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonianGravity {
    pub guard: ProximityGuard,
}

impl NewtonianGravity {
    pub fn new(guard: ProximityGuard) -> Self {
        Self { guard }
    }
}

impl Acceleration for NewtonianGravity {
    fn acceleration(&self, sys: &System, index: usize, offset: NVec2) -> NVec2 {
        let body = &sys.bodies[index];
        let x = body.position.load();
        let mut acc = NVec2::zeros();

        for &j in &body.peers {
            let peer = &sys.bodies[j];
            // relative position, differenced in integer meters first
            let rel = wrapping_sub(peer.position.load(), x);
            let dx = rel.x as f64 - offset.x;
            let dy = rel.y as f64 - offset.y;
            let r2 = dx * dx + dy * dy;

            if self.guard == ProximityGuard::AbortRemaining {
                let contact = (body.radius + peer.radius) as f64;
                if r2 <= contact * contact {
                    // early exit keeps the partial sum, the rest of the list is skipped
                    return acc;
                }
            }

            // a = mu / |r|^3, applied along r
            let a = peer.std_grav_param / (r2.sqrt() * r2);
            acc.x += a * dx;
            acc.y += a * dy;
        }
        acc
    }
}

/// Compute forces between body `index` and its tail peers, writing both sides
///
/// Cell `(i, j)` gets the force on `i` from `j` when `j` is massive, and cell
/// `(j, i)` gets the opposite force when `i` is massive. Each cell has a single
/// writer (the owner of the lower index), so workers never contend on a cell.
/// Does nothing if the system has no pair cache.
pub fn write_pair_forces(sys: &System, index: usize) {
    let Some(pairs) = sys.pairs.as_ref() else {
        return;
    };
    let n = sys.bodies.len();
    let body = &sys.bodies[index];
    debug_assert_eq!(body.worker_index, Some(index), "pair forces written before partitioning");
    let x = body.position.load();

    for &j in &body.peers {
        let peer = &sys.bodies[j];
        let rel = wrapping_sub(peer.position.load(), x);
        let dx = rel.x as f64;
        let dy = rel.y as f64;
        let r2 = dx * dx + dy * dy;
        let f = pairs.gmm[index * n + j] / (r2.sqrt() * r2);
        let force = NVec2::new(f * dx, f * dy);

        let on_self = if peer.is_massive { force } else { NVec2::zeros() };
        let on_peer = if body.is_massive { -force } else { NVec2::zeros() };
        pairs.forces[index * n + j].store(on_self);
        pairs.forces[j * n + index].store(on_peer);
    }
}

/// Net force on body `index` from the pair cache (row sum)
pub fn sum_pair_forces(sys: &System, index: usize) -> NVec2 {
    let Some(pairs) = sys.pairs.as_ref() else {
        return NVec2::zeros();
    };
    let n = sys.bodies.len();
    pairs.forces[index * n..(index + 1) * n]
        .iter()
        .fold(NVec2::zeros(), |sum, f| sum + f.load())
}
