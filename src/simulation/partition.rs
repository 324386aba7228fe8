//! Splits the body arena into per-worker assignments
//!
//! Two schemes:
//! - `RoundRobin`: body `i` goes to worker `i % W`; every body costs the same
//!   (full pairwise force law).
//! - `ZigZag`: workers are visited `0, 1, .., W-1, W-1, .., 1, 0, 0, 1, ..`;
//!   used with the symmetric strategy where body `i` only handles the `N - i`
//!   bodies after it, so early bodies are expensive and late ones cheap.
//!
//! Partitioning also materializes the matching peer sets on the bodies.

use log::debug;

use super::error::SimError;
use super::states::{PeerScheme, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionScheme {
    RoundRobin,
    ZigZag,
}

impl PartitionScheme {
    pub fn peer_scheme(self) -> PeerScheme {
        match self {
            PartitionScheme::RoundRobin => PeerScheme::Full,
            PartitionScheme::ZigZag => PeerScheme::Tail,
        }
    }
}

/// Disjoint, order-preserving body index lists, one per worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub scheme: PartitionScheme,
    pub workers: Vec<Vec<usize>>,
}

impl Assignment {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

/// Number of workers to run: requested or available parallelism, never above `bodies`
pub fn worker_count(requested: Option<usize>, bodies: usize) -> Result<usize, SimError> {
    if bodies == 0 {
        return Err(SimError::EmptyBodySet);
    }
    let wanted = match requested {
        Some(0) => {
            return Err(SimError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ))
        }
        Some(w) => w,
        None => std::thread::available_parallelism().map_or(1, |n| n.get()),
    };
    Ok(wanted.min(bodies))
}

/// Assign `n` body indices to `workers` lists using `scheme`
pub fn divide(n: usize, workers: usize, scheme: PartitionScheme) -> Vec<Vec<usize>> {
    let mut out = vec![Vec::with_capacity(n / workers.max(1) + 1); workers];
    if workers == 0 {
        return out;
    }
    match scheme {
        PartitionScheme::RoundRobin => {
            for i in 0..n {
                out[i % workers].push(i);
            }
        }
        PartitionScheme::ZigZag => {
            let mut worker = 0usize;
            let mut forward = true;
            for i in 0..n {
                out[worker].push(i);
                // bounce at both ends, visiting the end worker twice
                if forward {
                    if worker + 1 < workers {
                        worker += 1;
                    } else {
                        forward = false;
                    }
                } else if worker > 0 {
                    worker -= 1;
                } else {
                    forward = true;
                }
            }
        }
    }
    out
}

/// Partition `sys` for `workers` threads, rebuild peer sets and index every assigned body
pub fn partition(sys: &mut System, requested: Option<usize>, scheme: PartitionScheme) -> Result<Assignment, SimError> {
    let workers = worker_count(requested, sys.len())?;
    sys.assign_peers(scheme.peer_scheme());
    let assignment = Assignment {
        scheme,
        workers: divide(sys.len(), workers, scheme),
    };
    // canonical slot in the body array, the key of the pair cache
    for bodies in &assignment.workers {
        for &i in bodies {
            sys.bodies[i].worker_index = Some(i);
        }
    }
    debug!(
        "partitioned {} bodies over {} workers ({:?}), sizes {:?}",
        sys.len(),
        workers,
        scheme,
        assignment.workers.iter().map(Vec::len).collect::<Vec<_>>()
    );
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::states::BodyRecord;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn every_body_assigned_once_in_order(n in 1usize..400, workers in 1usize..17, zig in any::<bool>()) {
            let scheme = if zig { PartitionScheme::ZigZag } else { PartitionScheme::RoundRobin };
            let lists = divide(n, workers, scheme);
            prop_assert_eq!(lists.len(), workers);

            let mut seen = vec![false; n];
            for list in &lists {
                prop_assert!(list.windows(2).all(|w| w[0] < w[1]));
                for &i in list {
                    prop_assert!(!seen[i]);
                    seen[i] = true;
                }
            }
            prop_assert!(seen.iter().all(|&s| s));

            let sizes: Vec<usize> = lists.iter().map(Vec::len).collect();
            let spread = sizes.iter().max().unwrap() - sizes.iter().min().unwrap();
            prop_assert!(spread <= if zig { 2 } else { 1 }, "sizes {:?}", sizes);
        }
    }

    #[test]
    fn zig_zag_bounces_at_both_ends() {
        let lists = divide(8, 3, PartitionScheme::ZigZag);
        assert_eq!(lists, vec![vec![0, 5, 6], vec![1, 4, 7], vec![2, 3]]);
    }

    #[test]
    fn zig_zag_balances_triangular_cost() {
        // body i handles n - 1 - i pairs
        let n = 1000;
        let lists = divide(n, 4, PartitionScheme::ZigZag);
        let costs: Vec<usize> = lists
            .iter()
            .map(|l| l.iter().map(|&i| n - 1 - i).sum())
            .collect();
        let max = *costs.iter().max().unwrap();
        let min = *costs.iter().min().unwrap();
        assert!((max - min) as f64 / (max as f64) < 0.01, "costs {costs:?}");
    }

    #[test]
    fn worker_count_is_clamped_to_bodies() {
        assert_eq!(worker_count(Some(16), 3).unwrap(), 3);
        assert!(matches!(worker_count(Some(0), 3), Err(SimError::InvalidConfig(_))));
        assert!(matches!(worker_count(Some(2), 0), Err(SimError::EmptyBodySet)));
    }

    #[test]
    fn partition_indexes_every_body() {
        let records: Vec<BodyRecord> = (0..5)
            .map(|i| BodyRecord::new(&format!("b{i}"), 1.0, true, 0, [i * 1_000, 0], [0.0, 0.0]))
            .collect();
        let mut sys = System::from_records(&records, 1.0).unwrap();
        assert!(sys.bodies.iter().all(|b| b.worker_index.is_none()));

        let assignment = partition(&mut sys, Some(2), PartitionScheme::ZigZag).unwrap();
        assert_eq!(assignment.workers, vec![vec![0, 3, 4], vec![1, 2]]);
        assert_eq!(sys.peer_scheme(), Some(PeerScheme::Tail));
        assert_eq!(sys.bodies[3].worker_index, Some(3));
        assert_eq!(sys.bodies[2].worker_index, Some(2));
        assert_eq!(sys.bodies[1].peers, vec![2, 3, 4]);
    }

    #[test]
    fn indexed_bodies_fill_the_pair_cache() {
        use crate::simulation::forces::{sum_pair_forces, write_pair_forces};

        let records: Vec<BodyRecord> = (0..6)
            .map(|i| BodyRecord::new(&format!("b{i}"), 1.0e20, i != 2, 0, [i * 1_000_000, i * 7], [0.0, 0.0]))
            .collect();
        let mut sys = System::from_records(&records, 1.0).unwrap();
        let assignment = partition(&mut sys, Some(3), PartitionScheme::ZigZag).unwrap();

        for bodies in &assignment.workers {
            for &i in bodies {
                write_pair_forces(&sys, sys.bodies[i].worker_index.unwrap());
            }
        }
        let massive_total = [0, 1, 3, 4, 5]
            .iter()
            .fold(crate::simulation::states::NVec2::zeros(), |sum, &i| sum + sum_pair_forces(&sys, i));
        assert!(massive_total.norm() < 1e-6 * sum_pair_forces(&sys, 0).norm());
        // the particle is pulled but pulls nothing back
        assert!(sum_pair_forces(&sys, 2).norm() > 0.0);
    }
}
