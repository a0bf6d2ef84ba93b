//! Copies a subset of cells from a source mesh into a destination mesh,
//! remapping point references through a fresh deduplication episode and
//! pulling the matching attribute tuples.
//!
//! The destination mesh's attribute arrays must be preallocated (the
//! orchestrator sizes them once final totals are known); this module
//! writes through [`OutputCursors`], which track where the next points
//! and cells of each kind land.

use crate::error::RedistError;
use crate::mesh::{CellKind, KIND_COUNT, Mesh};
use crate::redist::dedup::PointDedup;
use crate::redist::transfer;

/// Write positions into a preallocated output mesh.
#[derive(Clone, Debug)]
pub struct OutputCursors {
    /// Next free tuple in the point attribute arrays (== points placed).
    pub point: usize,
    /// Cells of each kind placed so far.
    pub cell: [usize; KIND_COUNT],
    /// Global cell id of each kind's first cell in the *final* output.
    pub kind_base: [usize; KIND_COUNT],
}

impl OutputCursors {
    /// Cursors for an output that will hold `totals[k]` cells of kind `k`.
    pub fn new(totals: [usize; KIND_COUNT]) -> Self {
        let mut kind_base = [0usize; KIND_COUNT];
        let mut acc = 0;
        for k in 0..KIND_COUNT {
            kind_base[k] = acc;
            acc += totals[k];
        }
        Self {
            point: 0,
            cell: [0; KIND_COUNT],
            kind_base,
        }
    }

    /// Global cell-attribute offset for the next cell of kind `k`.
    #[inline]
    pub fn cell_attr_offset(&self, k: usize) -> usize {
        self.kind_base[k] + self.cell[k]
    }
}

/// Copy `counts[k]` cells of each kind from `src` into `dst`.
///
/// Without `explicit` lists the first `counts[k]` cells of each kind are
/// taken (the retained-prefix fast path); with lists, exactly those cell
/// indices. Point references are deduplicated within this single episode
/// and appended to `dst.points`; attribute tuples are written through
/// `cursors`. Counts exceeding the cells physically present are a
/// [`RedistError::BoundsViolation`], never an out-of-range read.
pub fn copy_cells(
    src: &Mesh,
    dst: &mut Mesh,
    counts: &[usize; KIND_COUNT],
    explicit: Option<&[Vec<u32>; KIND_COUNT]>,
    dedup: &mut PointDedup,
    cursors: &mut OutputCursors,
    fill_rank: Option<usize>,
) -> Result<(), RedistError> {
    dedup.reset(src.points.len());
    let point_base = cursors.point as u32;
    let src_bases = src.kind_offsets();

    let mut remapped = Vec::new();
    for (k, kind) in CellKind::ALL.iter().enumerate() {
        let block = src.cells(*kind);
        if explicit.is_none() && counts[k] > block.len() {
            return Err(RedistError::BoundsViolation(format!(
                "{kind:?}: requested {} cells, source has {}",
                counts[k],
                block.len()
            )));
        }

        let to_offset = cursors.cell_attr_offset(k);
        match explicit.map(|lists| &lists[k]) {
            None => {
                for i in 0..counts[k] {
                    remapped.clear();
                    for &pid in block.cell(i)? {
                        remapped.push(point_base + dedup.assign(pid));
                    }
                    dst.cells[k].push(&remapped);
                }
                for (s, d) in src
                    .cell_data
                    .arrays()
                    .iter()
                    .zip(dst.cell_data.arrays_mut())
                {
                    transfer::copy_block(s, d, counts[k], src_bases[k], to_offset, fill_rank)?;
                }
            }
            Some(list) => {
                if list.len() != counts[k] {
                    return Err(RedistError::InvalidSchedule(format!(
                        "{kind:?}: explicit list has {} cells, counts say {}",
                        list.len(),
                        counts[k]
                    )));
                }
                for &i in list {
                    remapped.clear();
                    for &pid in block.cell(i as usize)? {
                        remapped.push(point_base + dedup.assign(pid));
                    }
                    dst.cells[k].push(&remapped);
                }
                let from: Vec<u32> = list.iter().map(|&i| src_bases[k] as u32 + i).collect();
                for (s, d) in src
                    .cell_data
                    .arrays()
                    .iter()
                    .zip(dst.cell_data.arrays_mut())
                {
                    transfer::copy_values(s, d, &from, to_offset, fill_rank)?;
                }
            }
        }
        cursors.cell[k] += counts[k];
    }

    // Newly referenced points, in first-encounter order.
    for &orig in dedup.from_point_ids() {
        dst.points.push(src.points[orig as usize]);
    }
    for (s, d) in src
        .point_data
        .arrays()
        .iter()
        .zip(dst.point_data.arrays_mut())
    {
        transfer::copy_values(s, d, dedup.from_point_ids(), cursors.point, fill_rank)?;
    }
    cursors.point += dedup.len();

    Ok(())
}
