//! The per-rank redistribution plan: retained counts plus send and
//! receive obligations, one entry per peer, ordered by peer rank.
//!
//! The ascending-rank ordering is load-bearing: the pairwise exchange
//! loop derives its deadlock-avoiding service order from it (see
//! `redist::exchange`). Callers supply obligations in any order; the
//! orchestrator coalesces duplicates and sorts before exchanging.

use hashbrown::HashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::RedistError;
use crate::mesh::{CellKind, KIND_COUNT, Mesh};

/// Cells owed to one destination rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendObligation {
    pub dest: usize,
    /// Cells per kind to send.
    pub counts: [usize; KIND_COUNT],
    /// Explicit per-kind cell indices. `None` means "a contiguous range
    /// starting after previously retained/sent cells of that kind".
    pub cells: Option<[Vec<u32>; KIND_COUNT]>,
}

impl SendObligation {
    pub fn range(dest: usize, counts: [usize; KIND_COUNT]) -> Self {
        Self {
            dest,
            counts,
            cells: None,
        }
    }

    pub fn explicit(dest: usize, cells: [Vec<u32>; KIND_COUNT]) -> Self {
        let counts = std::array::from_fn(|k| cells[k].len());
        Self {
            dest,
            counts,
            cells: Some(cells),
        }
    }
}

/// Cells expected from one source rank.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecvObligation {
    pub source: usize,
    pub counts: [usize; KIND_COUNT],
}

/// One rank's plan for a single redistribution call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Cells of each kind that stay local (copied, not moved).
    pub retained: [usize; KIND_COUNT],
    pub sends: Vec<SendObligation>,
    pub recvs: Vec<RecvObligation>,
}

impl Schedule {
    /// The always-safe no-op plan: keep every cell, exchange nothing.
    pub fn retain_all(mesh: &Mesh) -> Self {
        Self {
            retained: std::array::from_fn(|k| mesh.cells(CellKind::ALL[k]).len()),
            sends: Vec::new(),
            recvs: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.sends.is_empty() && self.recvs.is_empty()
    }

    /// Merge obligations naming the same peer. Counts add; explicit index
    /// lists concatenate. A peer named both with an explicit list and
    /// with a contiguous range cannot be merged meaningfully.
    pub fn coalesced(self) -> Result<Schedule, RedistError> {
        let mut send_order = Vec::new();
        let mut send_map: HashMap<usize, SendObligation> = HashMap::new();
        for ob in self.sends {
            match send_map.get_mut(&ob.dest) {
                None => {
                    send_order.push(ob.dest);
                    send_map.insert(ob.dest, ob);
                }
                Some(prev) => {
                    match (&mut prev.cells, ob.cells) {
                        (None, None) => {}
                        (Some(mine), Some(theirs)) => {
                            for (k, list) in theirs.into_iter().enumerate() {
                                mine[k].extend(list);
                            }
                        }
                        _ => {
                            return Err(RedistError::InvalidSchedule(format!(
                                "rank {} named with both explicit and contiguous sends",
                                ob.dest
                            )));
                        }
                    }
                    for k in 0..KIND_COUNT {
                        prev.counts[k] += ob.counts[k];
                    }
                }
            }
        }

        let mut recv_order = Vec::new();
        let mut recv_map: HashMap<usize, RecvObligation> = HashMap::new();
        for ob in self.recvs {
            match recv_map.get_mut(&ob.source) {
                None => {
                    recv_order.push(ob.source);
                    recv_map.insert(ob.source, ob);
                }
                Some(prev) => {
                    for k in 0..KIND_COUNT {
                        prev.counts[k] += ob.counts[k];
                    }
                }
            }
        }

        Ok(Schedule {
            retained: self.retained,
            sends: send_order
                .into_iter()
                .filter_map(|d| send_map.remove(&d))
                .collect(),
            recvs: recv_order
                .into_iter()
                .filter_map(|s| recv_map.remove(&s))
                .collect(),
        })
    }

    /// Stable sort: sends ascending by destination, receives ascending by
    /// source. After coalescing, each peer appears at most once per
    /// direction, so there are no ties.
    pub fn ordered(mut self) -> Schedule {
        self.sends.sort_by_key(|ob| ob.dest);
        self.recvs.sort_by_key(|ob| ob.source);
        self
    }

    /// Reject plans the exchange cannot execute: self-obligations,
    /// duplicate peers, explicit lists disagreeing with their counts, or
    /// contiguous sends overrunning the source mesh.
    pub fn validate(&self, my_rank: usize, mesh: &Mesh) -> Result<(), RedistError> {
        for ob in &self.sends {
            if ob.dest == my_rank {
                return Err(RedistError::InvalidSchedule(format!(
                    "send obligation names own rank {my_rank}; use retained counts instead"
                )));
            }
            if let Some(cells) = &ob.cells {
                for k in 0..KIND_COUNT {
                    if cells[k].len() != ob.counts[k] {
                        return Err(RedistError::InvalidSchedule(format!(
                            "explicit list for rank {} has {} {:?} cells, counts say {}",
                            ob.dest,
                            cells[k].len(),
                            CellKind::ALL[k],
                            ob.counts[k]
                        )));
                    }
                }
            }
        }
        for ob in &self.recvs {
            if ob.source == my_rank {
                return Err(RedistError::InvalidSchedule(format!(
                    "receive obligation names own rank {my_rank}"
                )));
            }
        }
        for (dir, peers) in [
            ("send", self.sends.iter().map(|ob| ob.dest).collect::<Vec<_>>()),
            (
                "receive",
                self.recvs.iter().map(|ob| ob.source).collect::<Vec<_>>(),
            ),
        ] {
            if let Some(peer) = peers.iter().duplicates().next() {
                return Err(RedistError::InvalidSchedule(format!(
                    "rank {peer} appears twice in {dir} obligations"
                )));
            }
        }
        // Contiguous sends draw from the range after retained cells; the
        // whole claim must fit in the source.
        for (k, kind) in CellKind::ALL.iter().enumerate() {
            let contiguous: usize = self
                .sends
                .iter()
                .filter(|ob| ob.cells.is_none())
                .map(|ob| ob.counts[k])
                .sum();
            let available = mesh.cells(*kind).len();
            if self.retained[k] + contiguous > available {
                return Err(RedistError::BoundsViolation(format!(
                    "{kind:?}: retained {} + contiguous sends {} exceed {} cells present",
                    self.retained[k], contiguous, available
                )));
            }
        }
        Ok(())
    }
}
