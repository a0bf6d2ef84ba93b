//! In-process multi-rank backend: one `ThreadComm` per simulated rank,
//! all sharing a mailbox of FIFO queues keyed by `(src, dst, tag)`.
//!
//! Delivery per key is reliable and ordered, mirroring MPI point-to-point
//! semantics. Sends are buffered (the sender never blocks); receives block
//! on a condvar until a matching message arrives. This is the transport
//! used by the multi-rank tests, including the circular-wait harness.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use super::{Communicator, Wait};

/// (src, dst, tag)
type Key = (usize, usize, u16);

struct BarrierState {
    arrived: usize,
    generation: u64,
}

struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    /// Generation counter bumped on every delivery; receivers wait on it.
    delivery: Mutex<u64>,
    delivered: Condvar,
    n_ranks: usize,
    barrier: Mutex<BarrierState>,
    barrier_cv: Condvar,
}

impl Mailbox {
    fn new(n_ranks: usize) -> Self {
        Self {
            queues: DashMap::new(),
            delivery: Mutex::new(0),
            delivered: Condvar::new(),
            n_ranks,
            barrier: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            barrier_cv: Condvar::new(),
        }
    }

    fn push(&self, key: Key, payload: Bytes) {
        self.queues.entry(key).or_default().push_back(payload);
        let mut generation = self.delivery.lock();
        *generation += 1;
        self.delivered.notify_all();
    }

    fn try_pop(&self, key: Key) -> Option<Bytes> {
        self.queues.get_mut(&key).and_then(|mut q| q.pop_front())
    }

    fn pop_blocking(&self, key: Key) -> Bytes {
        loop {
            if let Some(msg) = self.try_pop(key) {
                return msg;
            }
            let mut generation = self.delivery.lock();
            // Re-check under the lock: a push may have raced the first poll.
            if let Some(msg) = self.try_pop(key) {
                return msg;
            }
            self.delivered.wait(&mut generation);
        }
    }
}

/// One simulated rank of an in-process world.
///
/// Build a world with [`ThreadComm::world`] and hand one handle to each
/// rank's thread.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    mailbox: Arc<Mailbox>,
}

impl ThreadComm {
    /// Create `n_ranks` communicators sharing one mailbox.
    pub fn world(n_ranks: usize) -> Vec<ThreadComm> {
        let mailbox = Arc::new(Mailbox::new(n_ranks));
        (0..n_ranks)
            .map(|rank| ThreadComm {
                rank,
                mailbox: mailbox.clone(),
            })
            .collect()
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.mailbox.n_ranks)
            .finish()
    }
}

/// Pending receive: waiting pops the next queued message for the key.
pub struct ThreadRecvHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        Some(self.mailbox.pop_blocking(self.key).to_vec())
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = ThreadRecvHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailbox.n_ranks
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.mailbox
            .push((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> ThreadRecvHandle {
        ThreadRecvHandle {
            mailbox: self.mailbox.clone(),
            key: (peer, self.rank, tag),
        }
    }

    fn barrier(&self) {
        let mut state = self.mailbox.barrier.lock();
        let my_generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.mailbox.n_ranks {
            state.arrived = 0;
            state.generation += 1;
            self.mailbox.barrier_cv.notify_all();
        } else {
            while state.generation == my_generation {
                self.mailbox.barrier_cv.wait(&mut state);
            }
        }
    }
}
