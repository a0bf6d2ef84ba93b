//! MPI backend (feature = "mpi-support").
//!
//! The engine drives its bulk transfers through the blocking `send`/`recv`
//! wrappers in schedule order, so this backend completes each operation
//! eagerly: `isend` performs a standard-mode send before returning and
//! `irecv` receives into the handle. Correctness relies on the schedule's
//! pairwise rank ordering, exactly as it does for [`super::ThreadComm`].

use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::{Communicator, Wait};

pub struct MpiComm {
    _universe: mpi::environment::Universe,
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    /// Initialize MPI and wrap the world communicator.
    pub fn new() -> Option<Self> {
        let universe = mpi::initialize()?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Some(Self {
            _universe: universe,
            world,
            rank,
            size,
        })
    }
}

/// Completed receive carrying its payload.
pub struct MpiRecvHandle(Option<Vec<u8>>);

impl Wait for MpiRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        self.0
    }
}

impl Communicator for MpiComm {
    type SendHandle = ();
    type RecvHandle = MpiRecvHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.world
            .process_at_rank(peer as i32)
            .send_with_tag(buf, tag as i32);
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecvHandle {
        let (data, _status) = self
            .world
            .process_at_rank(peer as i32)
            .receive_vec_with_tag::<u8>(tag as i32);
        MpiRecvHandle(Some(data))
    }

    fn barrier(&self) {
        self.world.barrier();
    }
}
