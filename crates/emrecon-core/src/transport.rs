//! Process-topology abstraction: a world communicator split into a
//! master rank plus two disjoint hemisphere sub-communicators, with
//! within-hemisphere all-reduce and world-wide broadcast primitives.
//!
//! [`LocalTransport`] is a single-rank no-op implementation used by
//! default (and exercised by `cargo test`); [`MpiTransport`] (feature
//! `mpi`) drives the real multi-rank behavior via the `mpi` crate, the
//! same rsmpi bindings other scientific-computing crates in this corpus
//! depend on.

use crate::error::Result;

/// Which hemisphere (independent half-map) a rank belongs to, or
/// `Master` for the coordination-only rank 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hemisphere {
    Master,
    A,
    B,
}

/// The process-topology and collective-communication seam the Optimiser
/// and Reconstructor call into. Implementations must let every rank
/// (including one with zero local contribution) participate in every
/// collective, so an empty hemisphere cannot hang the others.
pub trait Transport {
    fn rank(&self) -> usize;
    fn world_size(&self) -> usize;
    fn hemisphere(&self) -> Hemisphere;

    /// Sum `values` across every rank in this rank's hemisphere,
    /// in place.
    fn all_reduce_sum_hemisphere(&self, values: &mut [f64]) -> Result<()>;

    /// Broadcast `values` (as held by `root_hemisphere_leader`) to every
    /// rank in the world communicator, in place.
    fn broadcast_world(&self, values: &mut [f64], root: usize) -> Result<()>;
}

/// Single-rank transport: every collective is the identity on the
/// caller's own data. Used when the `mpi` feature is disabled, or when
/// `world_size == 1` even with it enabled — this is what lets the full
/// EM loop, Reconstructor, and Particle filter run under ordinary
/// `cargo test` without an MPI runtime.
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn hemisphere(&self) -> Hemisphere {
        Hemisphere::A
    }

    fn all_reduce_sum_hemisphere(&self, _values: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn broadcast_world(&self, _values: &mut [f64], _root: usize) -> Result<()> {
        Ok(())
    }
}

/// Split `world_size - 1` non-master ranks into two hemispheres of size
/// `floor((P-1)/2)` and `ceil((P-1)/2)`, per the process-topology
/// contract. Rank 0 is always `Master`.
pub fn hemisphere_for_rank(rank: usize, world_size: usize) -> Hemisphere {
    if rank == 0 {
        return Hemisphere::Master;
    }
    let workers = world_size - 1;
    let a_size = workers / 2;
    if rank - 1 < a_size {
        Hemisphere::A
    } else {
        Hemisphere::B
    }
}

#[cfg(feature = "mpi")]
pub mod mpi_transport {
    use super::{Hemisphere, Transport};
    use crate::error::{EmError, Result};
    use mpi::topology::Communicator;
    use mpi::traits::*;

    /// Real multi-rank transport built on `mpi`/rsmpi. The world
    /// communicator is split by [`super::hemisphere_for_rank`] into a
    /// master rank plus hemisphere `A`/`B` sub-communicators.
    pub struct MpiTransport {
        world: mpi::topology::SimpleCommunicator,
        hemisphere: Hemisphere,
        hemi_comm: Option<mpi::topology::SimpleCommunicator>,
    }

    impl MpiTransport {
        pub fn init() -> Result<Self> {
            let universe = mpi::initialize()
                .ok_or_else(|| EmError::Transport("failed to initialize MPI universe".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            let hemisphere = super::hemisphere_for_rank(rank, size);
            let color = match hemisphere {
                Hemisphere::Master => mpi::topology::Color::with_value(0),
                Hemisphere::A => mpi::topology::Color::with_value(1),
                Hemisphere::B => mpi::topology::Color::with_value(2),
            };
            let hemi_comm = world.split_by_color(color);
            Ok(Self {
                world,
                hemisphere,
                hemi_comm,
            })
        }
    }

    impl Transport for MpiTransport {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn world_size(&self) -> usize {
            self.world.size() as usize
        }

        fn hemisphere(&self) -> Hemisphere {
            self.hemisphere
        }

        fn all_reduce_sum_hemisphere(&self, values: &mut [f64]) -> Result<()> {
            if let Some(comm) = &self.hemi_comm {
                let input = values.to_vec();
                comm.all_reduce_into(&input[..], values, mpi::collective::SystemOperation::sum());
            }
            Ok(())
        }

        fn broadcast_world(&self, values: &mut [f64], root: usize) -> Result<()> {
            let root_process = self.world.process_at_rank(root as i32);
            root_process.broadcast_into(values);
            Ok(())
        }
    }
}

#[cfg(feature = "mpi")]
pub use mpi_transport::MpiTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_transport_all_reduce_is_identity() {
        let t = LocalTransport;
        let mut v = vec![1.0, 2.0, 3.0];
        t.all_reduce_sum_hemisphere(&mut v).unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn hemisphere_split_is_disjoint_and_balanced() {
        let world = 9; // rank 0 master, 8 workers -> 4 and 4
        assert_eq!(hemisphere_for_rank(0, world), Hemisphere::Master);
        let a = (1..world).filter(|&r| hemisphere_for_rank(r, world) == Hemisphere::A).count();
        let b = (1..world).filter(|&r| hemisphere_for_rank(r, world) == Hemisphere::B).count();
        assert_eq!(a, 4);
        assert_eq!(b, 4);
    }
}
