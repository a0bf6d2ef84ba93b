//! Fixed little-endian wire records and the tag scheme for one
//! redistribution call.
//!
//! All multi-byte integers are little-endian on the wire: stored pre-LE
//! with `.to_le()` and decoded with `::from_le()`. Bulk payloads
//! (connectivity words, coordinates, attribute values) are raw `Pod`
//! casts of the native little-endian representation.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::mesh::KIND_COUNT;

// ===== Tags ================================================================

/// Schema broadcast: array counts.
pub const TAG_SCHEMA_HDR: u16 = 100;
/// Schema broadcast: per-array records.
pub const TAG_SCHEMA_BODY: u16 = 101;
/// Per-rank agree/disagree vote, one byte.
pub const TAG_SCHEMA_VOTE: u16 = 102;
/// Rank 0's final go/no-go decision, one byte.
pub const TAG_SCHEMA_DECISION: u16 = 103;
/// Length-prefixed array names accompanying the schema body.
pub const TAG_SCHEMA_NAMES: u16 = 104;

/// Per-peer size record ([`WireSizes`]).
pub const TAG_SIZES: u16 = 110;
/// Packed cell connectivity, all kinds concatenated in kind order.
pub const TAG_CELLS: u16 = 111;
/// Point coordinates, 3 × f32 per point.
pub const TAG_POINTS: u16 = 112;

/// Attribute-payload slot for point arrays; cell arrays use the kind
/// index `0..KIND_COUNT`.
pub const POINT_ATTR_SLOT: usize = KIND_COUNT;

/// Deterministic attribute-payload tag: sender and receiver agree on it
/// from the array's position alone, no name lookup on the wire.
#[inline]
pub fn attr_tag(array_index: usize, slot: usize) -> u16 {
    (200 + 10 * array_index + slot) as u16
}

// ===== Records =============================================================

/// Sizes a receiver needs to preallocate every buffer for one peer:
/// per-kind cell counts, per-kind connectivity word counts, and the
/// deduplicated point count.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireSizes {
    pub cells_le: [u32; KIND_COUNT],
    pub conn_words_le: [u32; KIND_COUNT],
    pub points_le: u32,
}

impl WireSizes {
    pub fn new(cells: [usize; KIND_COUNT], conn_words: [usize; KIND_COUNT], points: usize) -> Self {
        Self {
            cells_le: cells.map(|c| (c as u32).to_le()),
            conn_words_le: conn_words.map(|c| (c as u32).to_le()),
            points_le: (points as u32).to_le(),
        }
    }

    pub fn cells(&self) -> [usize; KIND_COUNT] {
        self.cells_le.map(|c| u32::from_le(c) as usize)
    }

    pub fn conn_words(&self) -> [usize; KIND_COUNT] {
        self.conn_words_le.map(|c| u32::from_le(c) as usize)
    }

    pub fn points(&self) -> usize {
        u32::from_le(self.points_le) as usize
    }
}

/// Attribute-array counts preceding the schema body.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireSchemaHdr {
    pub point_arrays_le: u32,
    pub cell_arrays_le: u32,
}

impl WireSchemaHdr {
    pub fn new(point_arrays: usize, cell_arrays: usize) -> Self {
        Self {
            point_arrays_le: (point_arrays as u32).to_le(),
            cell_arrays_le: (cell_arrays as u32).to_le(),
        }
    }

    pub fn point_arrays(&self) -> usize {
        u32::from_le(self.point_arrays_le) as usize
    }

    pub fn cell_arrays(&self) -> usize {
        u32::from_le(self.cell_arrays_le) as usize
    }
}

/// One attribute array's shape signature on the wire.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireArraySchema {
    pub scalar_le: u32,
    pub components_le: u32,
}

impl WireArraySchema {
    pub fn new(scalar_code: u32, components: u32) -> Self {
        Self {
            scalar_le: scalar_code.to_le(),
            components_le: components.to_le(),
        }
    }

    pub fn scalar_code(&self) -> u32 {
        u32::from_le(self.scalar_le)
    }

    pub fn components(&self) -> u32 {
        u32::from_le(self.components_le)
    }
}

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Mutable byte view of typed storage, for filling straight from a
/// received payload.
pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode one record from a received payload. Received buffers are plain
/// byte allocations with no alignment guarantee, so records are rebuilt
/// by byte copy; a `&[u8]` to `&[T]` cast would panic on a misaligned
/// pointer. `bytes` must be exactly one record long.
pub fn read_pod<T: Pod>(bytes: &[u8]) -> T {
    bytemuck::pod_read_unaligned(bytes)
}

/// Decode a received payload as owned `T` values, alignment-free like
/// [`read_pod`]. `bytes` must be a whole number of records; callers
/// check the length against the size exchange first.
pub fn read_pod_vec<T: Pod>(bytes: &[u8]) -> Vec<T> {
    let mut out = vec![T::zeroed(); bytes.len() / std::mem::size_of::<T>()];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    out
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(std::mem::size_of::<WireSizes>(), 36);
const_assert_eq!(std::mem::size_of::<WireSchemaHdr>(), 8);
const_assert_eq!(std::mem::size_of::<WireArraySchema>(), 8);
