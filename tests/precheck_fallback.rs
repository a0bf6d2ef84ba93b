mod util;

use mesh_redist::prelude::*;
use util::*;

fn cross_schedule(rank: usize) -> Schedule {
    let other = 1 - rank;
    Schedule {
        retained: [0, 0, 0, 2],
        sends: vec![SendObligation::range(other, [0, 0, 0, 2])],
        recvs: vec![RecvObligation {
            source: other,
            counts: [0, 0, 0, 2],
        }],
    }
}

/// Mismatched schemas on two populated ranks: no payload moves, every
/// rank's output is a structural copy of its own input, and the call
/// still succeeds.
#[test]
fn schema_mismatch_degrades_to_structural_copy() {
    let results = run_world(2, |rank, comm| {
        let mut mesh = strip_mesh(4);
        if rank == 1 {
            // Rank 1 carries an extra array rank 0 does not have.
            mesh.cell_data.push(Attribute::new(
                "temperature",
                1,
                AttributeData::F64(vec![0.5; 4]),
            ));
        }
        let out = redistribute(
            &mesh,
            &cross_schedule(rank),
            &comm,
            &RedistributeOptions::default(),
        )
        .unwrap();
        (mesh, out)
    });

    for (input, output) in &results {
        assert_eq!(output, input);
    }
}

/// The fallback is idempotent: running the same mismatched exchange
/// twice gives the same (copied) result both times.
#[test]
fn fallback_is_idempotent() {
    let results = run_world(2, |rank, comm| {
        let mut mesh = strip_mesh(4);
        if rank == 0 {
            mesh.point_data.push(Attribute::new(
                "velocity",
                3,
                AttributeData::F32(vec![0.0; 18]),
            ));
        }
        let opts = RedistributeOptions::default();
        let first = redistribute(&mesh, &cross_schedule(rank), &comm, &opts).unwrap();
        let second = redistribute(&first, &cross_schedule(rank), &comm, &opts).unwrap();
        (mesh, first, second)
    });

    for (input, first, second) in &results {
        assert_eq!(first, input);
        assert_eq!(second, first);
    }
}

/// Component-count differences are schema differences even when the
/// scalar type matches.
#[test]
fn component_count_mismatch_falls_back() {
    let results = run_world(2, |rank, comm| {
        let mut mesh = strip_mesh(4);
        let components = if rank == 0 { 1 } else { 3 };
        mesh.point_data.push(Attribute::new(
            "velocity",
            components,
            AttributeData::F32(vec![0.0; 6 * components]),
        ));
        let out = redistribute(
            &mesh,
            &cross_schedule(rank),
            &comm,
            &RedistributeOptions::default(),
        )
        .unwrap();
        (mesh, out)
    });

    for (input, output) in &results {
        assert_eq!(output, input);
    }
}
