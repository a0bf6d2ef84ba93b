#![allow(dead_code)]
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use mesh_redist::prelude::*;

/// A fan of `n_strips` triangle strips over `n_strips + 2` points:
/// strip `i` references points `i, i+1, i+2`. Carries one f64 cell
/// array (`cell_id`, value = strip index) and one i32 point array
/// (`point_id`, value = point index).
pub fn strip_mesh(n_strips: usize) -> Mesh {
    let n_points = n_strips + 2;
    let mut mesh = Mesh::new();
    mesh.points = (0..n_points)
        .map(|i| [i as f32, (i % 2) as f32, 0.0])
        .collect();
    for i in 0..n_strips as u32 {
        mesh.cells_mut(CellKind::TriangleStrip).push(&[i, i + 1, i + 2]);
    }
    mesh.cell_data.push(Attribute::new(
        "cell_id",
        1,
        AttributeData::F64((0..n_strips).map(|i| i as f64).collect()),
    ));
    mesh.point_data.push(Attribute::new(
        "point_id",
        1,
        AttributeData::I32((0..n_points as i32).collect()),
    ));
    mesh
}

pub fn as_f64(attr: &Attribute) -> &[f64] {
    match &attr.data {
        AttributeData::F64(v) => v,
        other => panic!("expected F64 data, got {:?}", other.scalar_type()),
    }
}

pub fn as_i32(attr: &Attribute) -> &[i32] {
    match &attr.data {
        AttributeData::I32(v) => v,
        other => panic!("expected I32 data, got {:?}", other.scalar_type()),
    }
}

/// Run `f(rank, comm)` on one thread per rank and collect results in
/// rank order. Panics if any rank has not finished within `timeout`,
/// which is how the multi-rank tests surface a deadlock instead of
/// hanging the suite.
pub fn run_world_timeout<R, F>(n_ranks: usize, timeout: Duration, f: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(usize, ThreadComm) -> R + Send + Sync + 'static,
{
    let f = std::sync::Arc::new(f);
    let (tx, rx) = mpsc::channel();
    let mut handles = Vec::new();
    for (rank, comm) in ThreadComm::world(n_ranks).into_iter().enumerate() {
        let f = f.clone();
        let tx = tx.clone();
        handles.push(thread::spawn(move || {
            let _ = tx.send((rank, f(rank, comm)));
        }));
    }
    drop(tx);

    let mut results: Vec<Option<R>> = (0..n_ranks).map(|_| None).collect();
    for _ in 0..n_ranks {
        match rx.recv_timeout(timeout) {
            Ok((rank, result)) => results[rank] = Some(result),
            // Disconnected means a rank panicked; join below re-raises it.
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                panic!("a rank neither finished nor panicked within {timeout:?}: deadlock")
            }
        }
    }
    for h in handles {
        h.join().expect("rank thread panicked");
    }
    results.into_iter().map(|r| r.unwrap()).collect()
}

pub fn run_world<R, F>(n_ranks: usize, f: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(usize, ThreadComm) -> R + Send + Sync + 'static,
{
    run_world_timeout(n_ranks, Duration::from_secs(30), f)
}
