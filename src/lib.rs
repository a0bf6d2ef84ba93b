#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-redist
//!
//! mesh-redist moves partitioned polygonal surface meshes between the ranks of
//! a distributed program. Each rank supplies its local mesh and a
//! [`Schedule`](redist::schedule::Schedule) saying which cells stay, which go
//! to which peer, and which arrive from which peer; one collective call to
//! [`redistribute`](redist::redistribute) rebuilds every rank's local mesh
//! with all point and cell attributes carried along.
//!
//! ## Features
//! - Schedule-driven cell transfer with contiguous-range and explicit-list
//!   sends, coalescing and deterministic peer ordering
//! - Per-destination point deduplication so shared points cross the wire once
//! - Attribute transfer for the full numeric scalar family, dispatched at
//!   runtime from the array's stored type
//! - An all-ranks schema precheck that degrades the whole collective to a
//!   safe structural copy instead of exchanging mismatched payloads
//! - Pluggable communication backends: serial, in-process threads for
//!   testing, and MPI behind the `mpi-support` feature
//!
//! ## Determinism
//!
//! Output ordering is fully determined by the schedule: cells land grouped by
//! kind in peer-rank order, points in first-reference order. Randomized tests
//! fix their `SmallRng` seeds.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! mesh-redist = "0.3"
//! # features = ["mpi-support"]
//! ```

pub mod comm;
pub mod error;
pub mod mesh;
pub mod redist;

/// Convenient single-import surface for callers.
pub mod prelude {
    pub use crate::comm::{Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::error::RedistError;
    pub use crate::mesh::attributes::{Attribute, AttributeData, ScalarType};
    pub use crate::mesh::{CellKind, Mesh};
    pub use crate::redist::schedule::{RecvObligation, Schedule, SendObligation};
    pub use crate::redist::{RedistributeOptions, redistribute};
}
