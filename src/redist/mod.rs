//! Schedule-driven redistribution of a partitioned surface mesh.
//!
//! Every rank calls [`redistribute`] collectively with its own
//! [`Schedule`](schedule::Schedule). The call prechecks attribute-schema
//! agreement across ranks, exchanges per-peer size records, copies
//! retained cells locally, then runs the pairwise payload exchange. On
//! schema disagreement no payload moves at all: every rank falls back to
//! a structural copy of its input, so the collective either transfers
//! everywhere or nowhere.

pub mod copier;
pub mod dedup;
pub mod exchange;
pub mod precheck;
pub mod schedule;
pub mod transfer;
pub mod wire;

use log::{debug, warn};

use crate::comm::Communicator;
use crate::error::RedistError;
use crate::mesh::Mesh;
use crate::mesh::attributes::{AttributeSet, ScalarType};
use self::schedule::Schedule;

/// Knobs for one [`redistribute`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct RedistributeOptions {
    /// Debug mode: instead of copying attribute values, write the owning
    /// rank into every eligible (double-precision) tuple, so a
    /// visualization shows where each cell ended up.
    pub fill_rank: bool,
}

fn reject_untransferable(set: &AttributeSet) -> Result<(), RedistError> {
    for attr in set.iter() {
        if attr.scalar_type() == ScalarType::Bit {
            return Err(RedistError::UnsupportedAttributeType {
                name: attr.name.clone(),
                scalar: ScalarType::Bit,
            });
        }
    }
    Ok(())
}

/// Redistribute `input` according to `schedule` and return the rank's new
/// local mesh.
///
/// Collective over `comm`: every rank must call with mutually consistent
/// schedules (each send matched by the destination's receive). The input
/// mesh is never mutated. Errors are local and fatal for the whole
/// operation; the one global soft failure is schema disagreement, which
/// downgrades every rank to a deep copy of its own input.
pub fn redistribute<C: Communicator>(
    input: &Mesh,
    schedule: &Schedule,
    comm: &C,
    opts: &RedistributeOptions,
) -> Result<Mesh, RedistError> {
    input.validate()?;
    // Untransferable arrays abort before any traffic is posted.
    reject_untransferable(&input.point_data)?;
    reject_untransferable(&input.cell_data)?;

    let schedule = schedule.clone().coalesced()?.ordered();
    schedule.validate(comm.rank(), input)?;

    let check = precheck::schemas_agree(input, comm)?;
    if !check.agree {
        warn!(
            "rank {}: attribute schemas differ across ranks, falling back to structural copy",
            comm.rank()
        );
        return Ok(input.clone());
    }

    debug!(
        "rank {}: schedule accepted, retaining {:?}, {} sends, {} recvs",
        comm.rank(),
        schedule.retained,
        schedule.sends.len(),
        schedule.recvs.len()
    );
    exchange::run(input, &schedule, comm, opts, &check.template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::mesh::CellKind;
    use crate::mesh::attributes::{Attribute, AttributeData};

    fn two_strip_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.points = (0..4).map(|i| [i as f32, 0.0, 0.0]).collect();
        mesh.cells_mut(CellKind::TriangleStrip).push(&[0, 1, 2]);
        mesh.cells_mut(CellKind::TriangleStrip).push(&[1, 2, 3]);
        mesh.cell_data
            .push(Attribute::new("id", 1, AttributeData::F64(vec![10.0, 11.0])));
        mesh
    }

    #[test]
    fn retain_all_on_one_rank_is_identity_modulo_compaction() {
        let mesh = two_strip_mesh();
        let out = redistribute(
            &mesh,
            &Schedule::retain_all(&mesh),
            &NoComm,
            &RedistributeOptions::default(),
        )
        .unwrap();
        assert_eq!(out, mesh);
    }

    #[test]
    fn retained_prefix_drops_unreferenced_points() {
        let mut mesh = two_strip_mesh();
        mesh.points.push([9.0, 9.0, 9.0]); // referenced by nothing
        let schedule = Schedule {
            retained: [0, 0, 0, 2],
            sends: vec![],
            recvs: vec![],
        };
        let out =
            redistribute(&mesh, &schedule, &NoComm, &RedistributeOptions::default()).unwrap();
        // The output is rebuilt from cell references: the orphan point is
        // compacted away.
        assert_eq!(out.points.len(), 4);
        out.validate().unwrap();
    }

    #[test]
    fn bit_attribute_is_fatal_before_any_work() {
        let mut mesh = two_strip_mesh();
        mesh.cell_data
            .push(Attribute::new("ghost", 1, AttributeData::Bit(vec![0b11])));
        let err = redistribute(
            &mesh,
            &Schedule::retain_all(&mesh),
            &NoComm,
            &RedistributeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RedistError::UnsupportedAttributeType { scalar: ScalarType::Bit, .. }
        ));
    }

    #[test]
    fn invalid_input_mesh_is_rejected() {
        let mut mesh = two_strip_mesh();
        mesh.cells_mut(CellKind::Line).push(&[0, 77]);
        assert!(matches!(
            redistribute(
                &mesh,
                &Schedule::retain_all(&mesh),
                &NoComm,
                &RedistributeOptions::default()
            ),
            Err(RedistError::InvalidMesh(_))
        ));
    }
}
