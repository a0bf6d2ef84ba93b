//! Episode-scoped point deduplication index.
//!
//! Maps original point ids (positions in the source points array) to new
//! local ids assigned in first-encounter order, plus the reverse list used
//! to gather attribute tuples. The index is owned state with an explicit
//! [`PointDedup::reset`] per episode; stale mappings from a previous
//! episode must never leak into the next one.

/// Sentinel for "no new id assigned yet".
const UNASSIGNED: u32 = u32::MAX;

#[derive(Debug, Default)]
pub struct PointDedup {
    /// original id -> new id, `UNASSIGNED` where untouched.
    new_of_old: Vec<u32>,
    /// new id -> original id, in assignment order.
    old_of_new: Vec<u32>,
}

impl PointDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new episode able to address original ids `0..max_points`.
    /// Reuses the forward table's allocation but clears every entry.
    pub fn reset(&mut self, max_points: usize) {
        self.new_of_old.clear();
        self.new_of_old.resize(max_points, UNASSIGNED);
        self.old_of_new.clear();
    }

    /// New id for `original`, assigning the next sequential id on first
    /// encounter. Ids are strictly increasing in first-encounter order,
    /// which keeps output point ordering reproducible for a given
    /// traversal.
    pub fn assign(&mut self, original: u32) -> u32 {
        let slot = &mut self.new_of_old[original as usize];
        if *slot == UNASSIGNED {
            *slot = self.old_of_new.len() as u32;
            self.old_of_new.push(original);
        }
        *slot
    }

    /// Number of distinct points assigned this episode.
    pub fn len(&self) -> usize {
        self.old_of_new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old_of_new.is_empty()
    }

    /// Original id for each new id, in new-id order. This is the gather
    /// list for pulling attribute tuples into output order.
    pub fn from_point_ids(&self) -> &[u32] {
        &self.old_of_new
    }
}
