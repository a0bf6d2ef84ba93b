mod util;

use mesh_redist::prelude::*;
use util::*;

/// Rank 0 holds ten strips and keeps four; rank 1 starts empty and
/// receives the other six. Exact cell values, point values, and
/// deduplicated point counts are pinned down on both sides.
#[test]
fn two_ranks_split_a_strip_fan() {
    let results = run_world(2, |rank, comm| {
        let (mesh, schedule) = if rank == 0 {
            let mesh = strip_mesh(10);
            let schedule = Schedule {
                retained: [0, 0, 0, 4],
                sends: vec![SendObligation::range(1, [0, 0, 0, 6])],
                recvs: vec![],
            };
            (mesh, schedule)
        } else {
            let schedule = Schedule {
                retained: [0; 4],
                sends: vec![],
                recvs: vec![RecvObligation {
                    source: 0,
                    counts: [0, 0, 0, 6],
                }],
            };
            (Mesh::new(), schedule)
        };
        redistribute(&mesh, &schedule, &comm, &RedistributeOptions::default()).unwrap()
    });

    let out0 = &results[0];
    // Strips 0..4 reference points 0..6.
    assert_eq!(out0.cells(CellKind::TriangleStrip).len(), 4);
    assert_eq!(out0.points.len(), 6);
    assert_eq!(as_f64(&out0.cell_data.arrays()[0]), &[0.0, 1.0, 2.0, 3.0]);
    assert_eq!(as_i32(&out0.point_data.arrays()[0]), &[0, 1, 2, 3, 4, 5]);
    out0.validate().unwrap();

    let out1 = &results[1];
    // Strips 4..10 reference points 4..12: eight distinct points, sent
    // once each despite being shared between neighboring strips.
    assert_eq!(out1.cells(CellKind::TriangleStrip).len(), 6);
    assert_eq!(out1.points.len(), 8);
    assert_eq!(
        out1.cells(CellKind::TriangleStrip).cell(0).unwrap(),
        &[0, 1, 2]
    );
    assert_eq!(
        out1.cells(CellKind::TriangleStrip).cell(5).unwrap(),
        &[5, 6, 7]
    );
    // The empty rank adopted the broadcast schema, names included.
    assert_eq!(
        as_f64(out1.cell_data.by_name("cell_id").unwrap()),
        &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
    );
    assert_eq!(
        as_i32(out1.point_data.by_name("point_id").unwrap()),
        &[4, 5, 6, 7, 8, 9, 10, 11]
    );
    assert_eq!(out1.points[0], [4.0, 0.0, 0.0]);
    out1.validate().unwrap();
}

/// Mesh whose attribute values encode the owning rank, so cross-rank
/// tests can tell where each cell and point came from.
fn tagged_mesh(rank: usize, n_strips: usize) -> Mesh {
    let mut mesh = strip_mesh(n_strips);
    mesh.cell_data.arrays_mut()[0].data =
        AttributeData::F64((0..n_strips).map(|i| (rank * 100 + i) as f64).collect());
    mesh.point_data.arrays_mut()[0].data =
        AttributeData::I32((0..n_strips as i32 + 2).map(|i| rank as i32 * 100 + i).collect());
    mesh
}

/// Three ranks, every pair exchanging in both directions: each rank
/// keeps strips 0..2, sends 2,3 to its lower-ranked peer slot and 4,5 to
/// the higher one. Exercises the bidirectional tie-break on every pair.
#[test]
fn three_rank_all_to_all_exchange() {
    let results = run_world(3, |rank, comm| {
        let mesh = tagged_mesh(rank, 6);
        let peers: Vec<usize> = (0..3).filter(|&p| p != rank).collect();
        let schedule = Schedule {
            retained: [0, 0, 0, 2],
            sends: peers
                .iter()
                .map(|&p| SendObligation::range(p, [0, 0, 0, 2]))
                .collect(),
            recvs: peers
                .iter()
                .map(|&p| RecvObligation {
                    source: p,
                    counts: [0, 0, 0, 2],
                })
                .collect(),
        };
        redistribute(&mesh, &schedule, &comm, &RedistributeOptions::default()).unwrap()
    });

    // Sender s's contiguous range hands cells 2,3 to its first peer and
    // 4,5 to its second; receives merge in ascending source order.
    let expect_cells = [
        vec![0.0, 1.0, 102.0, 103.0, 202.0, 203.0],
        vec![100.0, 101.0, 2.0, 3.0, 204.0, 205.0],
        vec![200.0, 201.0, 4.0, 5.0, 104.0, 105.0],
    ];
    for (rank, out) in results.iter().enumerate() {
        assert_eq!(out.cells(CellKind::TriangleStrip).len(), 6);
        assert_eq!(as_f64(&out.cell_data.arrays()[0]), &expect_cells[rank]);
        // Retained strips 0,1 cover points 0..4; each received pair
        // covers 4 more.
        assert_eq!(out.points.len(), 12);
        out.validate().unwrap();
    }
    assert_eq!(
        as_i32(&results[0].point_data.arrays()[0]),
        &[0, 1, 2, 3, 102, 103, 104, 105, 202, 203, 204, 205]
    );
}

/// Explicit index lists pick cells out of order; the receiver sees them
/// in list order with matching attributes.
#[test]
fn explicit_lists_send_cells_in_list_order() {
    let results = run_world(2, |rank, comm| {
        let (mesh, schedule) = if rank == 0 {
            let mesh = strip_mesh(8);
            let schedule = Schedule {
                retained: [0, 0, 0, 3],
                sends: vec![SendObligation::explicit(
                    1,
                    [vec![], vec![], vec![], vec![5, 1]],
                )],
                recvs: vec![],
            };
            (mesh, schedule)
        } else {
            let schedule = Schedule {
                retained: [0; 4],
                sends: vec![],
                recvs: vec![RecvObligation {
                    source: 0,
                    counts: [0, 0, 0, 2],
                }],
            };
            (Mesh::new(), schedule)
        };
        redistribute(&mesh, &schedule, &comm, &RedistributeOptions::default()).unwrap()
    });

    let out1 = &results[1];
    assert_eq!(as_f64(&out1.cell_data.arrays()[0]), &[5.0, 1.0]);
    // Cell 5 arrives first: its points 5,6,7 claim new ids 0,1,2.
    assert_eq!(
        out1.cells(CellKind::TriangleStrip).cell(0).unwrap(),
        &[0, 1, 2]
    );
    assert_eq!(
        out1.cells(CellKind::TriangleStrip).cell(1).unwrap(),
        &[3, 4, 5]
    );
    assert_eq!(as_i32(&out1.point_data.arrays()[0]), &[5, 6, 7, 1, 2, 3]);
}

/// Cells of several kinds move together; cell attributes stay indexed by
/// the kind-concatenated global cell order on both sides.
#[test]
fn mixed_kinds_keep_global_attribute_order() {
    let results = run_world(2, |rank, comm| {
        let (mesh, schedule) = if rank == 0 {
            let mut mesh = Mesh::new();
            mesh.points = (0..6).map(|i| [i as f32, 0.0, 0.0]).collect();
            mesh.cells_mut(CellKind::Vertex).push(&[0]);
            mesh.cells_mut(CellKind::Vertex).push(&[5]);
            mesh.cells_mut(CellKind::Line).push(&[0, 1]);
            mesh.cells_mut(CellKind::Line).push(&[4, 5]);
            mesh.cells_mut(CellKind::TriangleStrip).push(&[0, 1, 2]);
            mesh.cells_mut(CellKind::TriangleStrip).push(&[3, 4, 5]);
            mesh.cell_data.push(Attribute::new(
                "cell_id",
                1,
                AttributeData::F64((0..6).map(|i| i as f64).collect()),
            ));
            let schedule = Schedule {
                retained: [1, 1, 0, 1],
                sends: vec![SendObligation::range(1, [1, 1, 0, 1])],
                recvs: vec![],
            };
            (mesh, schedule)
        } else {
            let schedule = Schedule {
                retained: [0; 4],
                sends: vec![],
                recvs: vec![RecvObligation {
                    source: 0,
                    counts: [1, 1, 0, 1],
                }],
            };
            (Mesh::new(), schedule)
        };
        redistribute(&mesh, &schedule, &comm, &RedistributeOptions::default()).unwrap()
    });

    // Global cell order is vertex, line, polygon, strip. Rank 0 keeps
    // the first cell of each populated kind (global ids 0, 2, 4), rank 1
    // gets the second of each (global ids 1, 3, 5).
    assert_eq!(as_f64(&results[0].cell_data.arrays()[0]), &[0.0, 2.0, 4.0]);
    assert_eq!(as_f64(&results[1].cell_data.arrays()[0]), &[1.0, 3.0, 5.0]);
    for out in &results {
        assert_eq!(out.cells(CellKind::Vertex).len(), 1);
        assert_eq!(out.cells(CellKind::Line).len(), 1);
        assert_eq!(out.cells(CellKind::TriangleStrip).len(), 1);
        out.validate().unwrap();
    }
}

/// A sender whose schedule declares different per-kind counts than the
/// receiver expects is caught in the size-exchange phase, before any
/// payload is merged.
#[test]
fn size_declaration_mismatch_is_fatal_for_the_receiver() {
    let results = run_world(2, |rank, comm| {
        let mesh = strip_mesh(6);
        let schedule = if rank == 0 {
            Schedule {
                retained: [0, 0, 0, 3],
                sends: vec![SendObligation::range(1, [0, 0, 0, 3])],
                recvs: vec![],
            }
        } else {
            Schedule {
                retained: [0, 0, 0, 6],
                sends: vec![],
                recvs: vec![RecvObligation {
                    source: 0,
                    counts: [0, 0, 0, 5],
                }],
            }
        };
        redistribute(&mesh, &schedule, &comm, &RedistributeOptions::default())
    });

    // The sender has no receive obligations and completes on its own.
    assert!(results[0].is_ok());
    match &results[1] {
        Err(RedistError::ScheduleSizeViolation { peer: 0, .. }) => {}
        other => panic!("expected a size violation from rank 0, got {other:?}"),
    }
}

/// Fill-rank mode writes the owning rank into double-precision arrays
/// and leaves other types alone.
#[test]
fn fill_rank_labels_cells_by_owner() {
    let opts = RedistributeOptions { fill_rank: true };
    let results = run_world(2, move |rank, comm| {
        let (mesh, schedule) = if rank == 0 {
            let mesh = strip_mesh(4);
            let schedule = Schedule {
                retained: [0, 0, 0, 2],
                sends: vec![SendObligation::range(1, [0, 0, 0, 2])],
                recvs: vec![],
            };
            (mesh, schedule)
        } else {
            let schedule = Schedule {
                retained: [0; 4],
                sends: vec![],
                recvs: vec![RecvObligation {
                    source: 0,
                    counts: [0, 0, 0, 2],
                }],
            };
            (Mesh::new(), schedule)
        };
        redistribute(&mesh, &schedule, &comm, &opts).unwrap()
    });

    assert_eq!(as_f64(&results[0].cell_data.arrays()[0]), &[0.0, 0.0]);
    assert_eq!(as_f64(&results[1].cell_data.arrays()[0]), &[1.0, 1.0]);
    // i32 point labels are ineligible for substitution.
    assert_eq!(as_i32(&results[0].point_data.arrays()[0]), &[0, 1, 2, 3]);
    assert_eq!(as_i32(&results[1].point_data.arrays()[0]), &[2, 3, 4, 5]);
}
