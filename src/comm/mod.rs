//! Thin façade over in-process or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices addressed by `(rank, tag)`.
//! Handles are waitable: callers must `.wait()` before trusting that a
//! receive buffer is filled or that a send buffer may be reused. The
//! redistribution engine itself only uses the blocking [`Communicator::send`]
//! / [`Communicator::recv`] wrappers; its deadlock freedom comes from the
//! schedule ordering, not from non-blocking primitives.

mod thread;

pub use self::thread::ThreadComm;

#[cfg(feature = "mpi-support")]
mod mpi;
#[cfg(feature = "mpi-support")]
pub use self::mpi::MpiComm;

/// Non-blocking point-to-point communication interface.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This process's rank in `[0, size)`.
    fn rank(&self) -> usize;
    /// Number of participating ranks.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Block until every rank has entered the barrier.
    fn barrier(&self);

    /// Blocking send: returns once the transport has accepted the buffer.
    fn send(&self, peer: usize, tag: u16, buf: &[u8]) {
        let _ = self.isend(peer, tag, buf).wait();
    }

    /// Blocking receive of exactly `len` bytes (the caller knows the size
    /// from a prior size exchange). Returns `None` if the backend cannot
    /// deliver (e.g. [`NoComm`]); the payload may differ from `len` when
    /// the sender disagrees about the message size, which callers must
    /// treat as a protocol violation.
    fn recv(&self, peer: usize, tag: u16, len: usize) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.irecv(peer, tag, &mut buf).wait()
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial unit tests and single-rank runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn barrier(&self) {}
}
