//! Packed cell connectivity for one topological kind.
//!
//! Cells are stored as a flat arena of `(point_count, id0..idn-1)` records
//! in `u32`, the same layout the wire format uses, plus an offsets table
//! for O(1) by-index access. Raw walks over the arena go through
//! [`CellCursor`] so every bounds check lives in one place.

use serde::{Deserialize, Serialize};

use crate::error::RedistError;

/// Cells of a single kind as a packed connectivity arena.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellBlock {
    /// `(point_count, ids...)` records back to back.
    conn: Vec<u32>,
    /// Start of each cell's record in `conn` (index of its count word).
    offsets: Vec<u32>,
}

impl CellBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Total connectivity words (counts + ids), i.e. the wire size.
    #[inline]
    pub fn conn_len(&self) -> usize {
        self.conn.len()
    }

    /// Raw packed connectivity, for wire transfer.
    #[inline]
    pub fn conn(&self) -> &[u32] {
        &self.conn
    }

    /// Append one cell.
    pub fn push(&mut self, point_ids: &[u32]) {
        self.offsets.push(self.conn.len() as u32);
        self.conn.push(point_ids.len() as u32);
        self.conn.extend_from_slice(point_ids);
    }

    /// Point ids of cell `i`.
    pub fn cell(&self, i: usize) -> Result<&[u32], RedistError> {
        let start = *self
            .offsets
            .get(i)
            .ok_or_else(|| RedistError::BoundsViolation(format!("cell {i} of {}", self.len())))?
            as usize;
        let n = self.conn[start] as usize;
        Ok(&self.conn[start + 1..start + 1 + n])
    }

    /// Cursor over the packed records, starting at the first cell.
    pub fn cursor(&self) -> CellCursor<'_> {
        CellCursor::new(&self.conn)
    }

    /// Rebuild a block from a packed arena received off the wire,
    /// validating record framing against the claimed cell count.
    pub fn from_packed(conn: Vec<u32>, n_cells: usize) -> Result<Self, RedistError> {
        let mut offsets = Vec::with_capacity(n_cells);
        let mut cursor = CellCursor::new(&conn);
        for _ in 0..n_cells {
            offsets.push(cursor.position() as u32);
            cursor.read_cell()?;
        }
        if cursor.position() != conn.len() {
            return Err(RedistError::BoundsViolation(format!(
                "packed connectivity has {} trailing words after {} cells",
                conn.len() - cursor.position(),
                n_cells
            )));
        }
        Ok(Self { conn, offsets })
    }
}

/// Checked forward reader over a packed `(count, ids...)` arena.
pub struct CellCursor<'a> {
    data: &'a [u32],
    pos: usize,
}

impl<'a> CellCursor<'a> {
    pub fn new(data: &'a [u32]) -> Self {
        Self { data, pos: 0 }
    }

    /// Word offset of the next unread record.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// True once every record has been consumed.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Read the next cell's point ids and advance past its record.
    pub fn read_cell(&mut self) -> Result<&'a [u32], RedistError> {
        let count = *self.data.get(self.pos).ok_or_else(|| {
            RedistError::BoundsViolation(format!(
                "connectivity cursor at {} past end ({} words)",
                self.pos,
                self.data.len()
            ))
        })? as usize;
        let start = self.pos + 1;
        let end = start + count;
        if end > self.data.len() {
            return Err(RedistError::BoundsViolation(format!(
                "cell record at word {} claims {} points but only {} words remain",
                self.pos,
                count,
                self.data.len() - start
            )));
        }
        self.pos = end;
        Ok(&self.data[start..end])
    }
}
