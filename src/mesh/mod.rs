//! The surface-mesh data model being redistributed.
//!
//! A [`Mesh`] holds 3D points (`f32` storage precision), four blocks of
//! cells in a fixed topological-kind order, and named attribute arrays
//! attached to points and to cells. Cell-attribute arrays are indexed by
//! the *global* cell id: cells of all kinds concatenated in
//! [`CellKind::ALL`] order.

pub mod attributes;
pub mod cells;

use serde::{Deserialize, Serialize};

use crate::error::RedistError;
use self::attributes::{AttributeSet, ScalarType};
use self::cells::CellBlock;

/// Number of topological cell kinds.
pub const KIND_COUNT: usize = 4;

/// Topological kind of a surface-mesh cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    /// 0D vertex cell.
    Vertex,
    /// Polyline segment.
    Line,
    /// Closed polygon.
    Polygon,
    /// Triangle strip.
    TriangleStrip,
}

impl CellKind {
    /// Canonical concatenation order for cells and cell attributes.
    pub const ALL: [CellKind; KIND_COUNT] = [
        CellKind::Vertex,
        CellKind::Line,
        CellKind::Polygon,
        CellKind::TriangleStrip,
    ];

    /// Position in [`CellKind::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            CellKind::Vertex => 0,
            CellKind::Line => 1,
            CellKind::Polygon => 2,
            CellKind::TriangleStrip => 3,
        }
    }
}

/// Shape signature of one attribute array, as compared by the prechecker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraySchema {
    pub scalar: ScalarType,
    pub components: u32,
}

/// Shape signature of a mesh's attribute arrays.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeshSchema {
    pub point_arrays: Vec<ArraySchema>,
    pub cell_arrays: Vec<ArraySchema>,
}

/// A partitioned polygonal surface mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub points: Vec<[f32; 3]>,
    pub cells: [CellBlock; KIND_COUNT],
    pub point_data: AttributeSet,
    pub cell_data: AttributeSet,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cells(&self, kind: CellKind) -> &CellBlock {
        &self.cells[kind.index()]
    }

    #[inline]
    pub fn cells_mut(&mut self, kind: CellKind) -> &mut CellBlock {
        &mut self.cells[kind.index()]
    }

    /// Total cell count across all kinds.
    pub fn total_cells(&self) -> usize {
        self.cells.iter().map(|b| b.len()).sum()
    }

    /// Global cell id of each kind's first cell, in [`CellKind::ALL`]
    /// order. Cell attributes are indexed by these offsets plus the
    /// within-kind index.
    pub fn kind_offsets(&self) -> [usize; KIND_COUNT] {
        let mut offsets = [0usize; KIND_COUNT];
        let mut acc = 0;
        for (k, block) in self.cells.iter().enumerate() {
            offsets[k] = acc;
            acc += block.len();
        }
        offsets
    }

    /// A mesh with zero points and zero cells is exempt from schema
    /// agreement: it has nothing to contribute or receive shape from.
    pub fn is_structurally_empty(&self) -> bool {
        self.points.is_empty() && self.total_cells() == 0
    }

    /// Attribute shape signature for the prechecker.
    pub fn schema(&self) -> MeshSchema {
        let sig = |set: &AttributeSet| {
            set.iter()
                .map(|a| ArraySchema {
                    scalar: a.scalar_type(),
                    components: a.components as u32,
                })
                .collect()
        };
        MeshSchema {
            point_arrays: sig(&self.point_data),
            cell_arrays: sig(&self.cell_data),
        }
    }

    /// Check the structural invariants: every cell references an existing
    /// point, and every attribute array is sized for its domain.
    pub fn validate(&self) -> Result<(), RedistError> {
        let n_points = self.points.len() as u32;
        for kind in CellKind::ALL {
            let block = self.cells(kind);
            let mut cursor = block.cursor();
            while !cursor.is_done() {
                for &pid in cursor.read_cell()? {
                    if pid >= n_points {
                        return Err(RedistError::InvalidMesh(format!(
                            "{kind:?} cell references point {pid} of {n_points}"
                        )));
                    }
                }
            }
        }
        for attr in self.point_data.iter() {
            if attr.scalar_type() != ScalarType::Bit && attr.tuples() != self.points.len() {
                return Err(RedistError::InvalidMesh(format!(
                    "point attribute `{}` has {} tuples for {} points",
                    attr.name,
                    attr.tuples(),
                    self.points.len()
                )));
            }
        }
        let n_cells = self.total_cells();
        for attr in self.cell_data.iter() {
            if attr.scalar_type() != ScalarType::Bit && attr.tuples() != n_cells {
                return Err(RedistError::InvalidMesh(format!(
                    "cell attribute `{}` has {} tuples for {} cells",
                    attr.name,
                    attr.tuples(),
                    n_cells
                )));
            }
        }
        Ok(())
    }
}
