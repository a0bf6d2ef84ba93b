//! RedistError: unified error type for mesh-redist public APIs.
//!
//! Every fallible operation in this crate reports through this enum so
//! callers can match on the failure class. Schema disagreement between
//! ranks is deliberately *not* represented here: the prechecker resolves
//! it internally by degrading to a safe structural copy.

use crate::mesh::attributes::ScalarType;
use thiserror::Error;

/// Unified error type for redistribution operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RedistError {
    /// An attribute array uses a type the transfer engine cannot serialize
    /// (e.g. packed single-bit booleans). Fatal for the whole call: a
    /// malformed buffer must never reach the wire.
    #[error("attribute `{name}` has unsupported scalar type {scalar:?}")]
    UnsupportedAttributeType { name: String, scalar: ScalarType },

    /// Source and destination arrays disagree on scalar type or component
    /// count. Indicates a caller bug; surfaced rather than mis-cast.
    #[error("attribute `{name}` type mismatch between source and destination")]
    AttributeTypeMismatch { name: String },

    /// A peer's declared transfer size does not match the locally computed
    /// schedule. The two ranks built different schedules; this is a logic
    /// bug in the partitioning policy and must not be worked around.
    #[error("schedule size violation with rank {peer}: {detail}")]
    ScheduleSizeViolation { peer: usize, detail: String },

    /// A requested cell range or index exceeds what the source mesh holds.
    #[error("bounds violation: {0}")]
    BoundsViolation(String),

    /// The schedule itself is malformed (self-obligation, duplicate peer
    /// after coalescing, count/list disagreement).
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The mesh violates a structural invariant (dangling connectivity,
    /// attribute length mismatch).
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// A point-to-point operation with `neighbor` failed or returned a
    /// malformed message.
    #[error("communication with rank {neighbor} failed: {detail}")]
    CommError { neighbor: usize, detail: String },
}
