//! The exchange orchestrator: drives one full redistribution after the
//! precheck has passed.
//!
//! Phases per call: build send units (pure local work), SIZE_EXCHANGE,
//! preallocate the output, LOCAL_COPY of retained cells, then the
//! PAIRWISE_EXCHANGE payload loop. Both communicating phases run through
//! one pairwise driver: service whichever unprocessed obligation names
//! the smaller peer rank; when the send and receive queues are
//! simultaneously at the same peer, the lower-numbered rank services its
//! receive first and the higher its send first. Applied uniformly at
//! both ends, that single rule keeps pure blocking transfers free of
//! circular waits.

use bytemuck::Zeroable;
use log::debug;

use crate::comm::Communicator;
use crate::error::RedistError;
use crate::mesh::attributes::Attribute;
use crate::mesh::cells::CellBlock;
use crate::mesh::{CellKind, KIND_COUNT, Mesh};
use crate::redist::RedistributeOptions;
use crate::redist::copier::{self, OutputCursors};
use crate::redist::dedup::PointDedup;
use crate::redist::precheck::SchemaTemplate;
use crate::redist::schedule::Schedule;
use crate::redist::transfer;
use crate::redist::wire::{
    POINT_ATTR_SLOT, TAG_CELLS, TAG_POINTS, TAG_SIZES, WireSizes, attr_tag, cast_slice,
    expect_exact_len, read_pod, read_pod_vec,
};

/// Everything one send obligation transmits, computed before any traffic:
/// packed connectivity remapped to episode-local point ids, the gather
/// list of original point ids, and how to pull cell-attribute tuples.
struct SendUnit {
    dest: usize,
    counts: [usize; KIND_COUNT],
    /// Packed `(count, ids...)` per kind, ids episode-local.
    conn: [Vec<u32>; KIND_COUNT],
    /// Global cell-attribute indices per kind (explicit-list sends).
    cell_ids: Option<[Vec<u32>; KIND_COUNT]>,
    /// First global cell-attribute index per kind (contiguous sends).
    contiguous_from: Option<[usize; KIND_COUNT]>,
    /// Original point ids in new-id order: the attribute gather list.
    point_ids: Vec<u32>,
}

fn build_send_units(mesh: &Mesh, schedule: &Schedule) -> Result<Vec<SendUnit>, RedistError> {
    let src_bases = mesh.kind_offsets();
    let mut next = schedule.retained;
    let mut dedup = PointDedup::new();
    let mut units = Vec::with_capacity(schedule.sends.len());

    for ob in &schedule.sends {
        dedup.reset(mesh.points.len());
        let mut conn: [Vec<u32>; KIND_COUNT] = Default::default();
        let mut cell_ids: [Vec<u32>; KIND_COUNT] = Default::default();
        let mut contiguous_from = [0usize; KIND_COUNT];

        for (k, kind) in CellKind::ALL.iter().enumerate() {
            let block = mesh.cells(*kind);
            let indices: Vec<u32> = match &ob.cells {
                Some(lists) => lists[k].clone(),
                None => {
                    let start = next[k];
                    let end = start + ob.counts[k];
                    if end > block.len() {
                        return Err(RedistError::BoundsViolation(format!(
                            "{kind:?}: send range {start}..{end} exceeds {} cells",
                            block.len()
                        )));
                    }
                    next[k] = end;
                    contiguous_from[k] = src_bases[k] + start;
                    (start as u32..end as u32).collect()
                }
            };
            for &i in &indices {
                let ids = block.cell(i as usize)?;
                conn[k].push(ids.len() as u32);
                for &pid in ids {
                    conn[k].push(dedup.assign(pid));
                }
            }
            if ob.cells.is_some() {
                cell_ids[k] = indices.iter().map(|&i| src_bases[k] as u32 + i).collect();
            }
        }

        units.push(SendUnit {
            dest: ob.dest,
            counts: ob.counts,
            conn,
            cell_ids: ob.cells.as_ref().map(|_| cell_ids),
            contiguous_from: ob.cells.as_ref().map_or(Some(contiguous_from), |_| None),
            point_ids: dedup.from_point_ids().to_vec(),
        });
    }
    Ok(units)
}

/// Number of distinct points the retained-cell episode will append.
fn count_retained_points(mesh: &Mesh, retained: &[usize; KIND_COUNT]) -> Result<usize, RedistError> {
    let mut dedup = PointDedup::new();
    dedup.reset(mesh.points.len());
    for (k, kind) in CellKind::ALL.iter().enumerate() {
        let block = mesh.cells(*kind);
        for i in 0..retained[k] {
            for &pid in block.cell(i)? {
                dedup.assign(pid);
            }
        }
    }
    Ok(dedup.len())
}

/// Service send and receive obligations in the deadlock-avoiding order.
/// `send_peers` and `recv_peers` must be ascending (the schedule orderer
/// guarantees it).
fn pairwise<E>(
    my_rank: usize,
    send_peers: &[usize],
    recv_peers: &[usize],
    mut do_send: impl FnMut(usize) -> Result<(), E>,
    mut do_recv: impl FnMut(usize) -> Result<(), E>,
) -> Result<(), E> {
    let (mut si, mut ri) = (0, 0);
    while si < send_peers.len() || ri < recv_peers.len() {
        match (send_peers.get(si), recv_peers.get(ri)) {
            (Some(&sp), Some(&rp)) if sp < rp => {
                do_send(si)?;
                si += 1;
            }
            (Some(&sp), Some(&rp)) if rp < sp => {
                do_recv(ri)?;
                ri += 1;
            }
            (Some(&peer), Some(_)) => {
                // True bidirectional exchange with `peer`: the lower rank
                // receives first, the higher sends first.
                if my_rank < peer {
                    do_recv(ri)?;
                    ri += 1;
                } else {
                    do_send(si)?;
                    si += 1;
                }
            }
            (Some(_), None) => {
                do_send(si)?;
                si += 1;
            }
            (None, Some(_)) => {
                do_recv(ri)?;
                ri += 1;
            }
            (None, None) => unreachable!("loop condition"),
        }
    }
    Ok(())
}

fn comm_err(neighbor: usize, what: String) -> RedistError {
    RedistError::CommError {
        neighbor,
        detail: what,
    }
}

/// Run the post-precheck phases and return the reconstructed local mesh.
///
/// `template` is the schema the precheck agreed on; a structurally empty
/// rank has no arrays of its own and builds its output arrays from it.
pub(crate) fn run<C: Communicator>(
    input: &Mesh,
    schedule: &Schedule,
    comm: &C,
    opts: &RedistributeOptions,
    template: &SchemaTemplate,
) -> Result<Mesh, RedistError> {
    let my_rank = comm.rank();
    let fill = opts.fill_rank.then_some(my_rank);

    let units = build_send_units(input, schedule)?;
    let send_peers: Vec<usize> = units.iter().map(|u| u.dest).collect();
    let recv_peers: Vec<usize> = schedule.recvs.iter().map(|r| r.source).collect();

    // --- SIZE_EXCHANGE -----------------------------------------------------
    debug!(
        "rank {my_rank}: size exchange with {} send / {} recv peers",
        send_peers.len(),
        recv_peers.len()
    );
    let mut incoming = vec![WireSizes::zeroed(); schedule.recvs.len()];
    pairwise(
        my_rank,
        &send_peers,
        &recv_peers,
        |si| {
            let u = &units[si];
            let conn_words = std::array::from_fn(|k| u.conn[k].len());
            let sizes = WireSizes::new(u.counts, conn_words, u.point_ids.len());
            comm.send(u.dest, TAG_SIZES, cast_slice(std::slice::from_ref(&sizes)));
            Ok(())
        },
        |ri| {
            let ob = &schedule.recvs[ri];
            let bytes = comm
                .recv(ob.source, TAG_SIZES, std::mem::size_of::<WireSizes>())
                .ok_or_else(|| comm_err(ob.source, "missing size record".into()))?;
            expect_exact_len(bytes.len(), std::mem::size_of::<WireSizes>()).map_err(|e| {
                RedistError::ScheduleSizeViolation {
                    peer: ob.source,
                    detail: format!("size record: {e}"),
                }
            })?;
            let sizes: WireSizes = read_pod(&bytes);
            if sizes.cells() != ob.counts {
                return Err(RedistError::ScheduleSizeViolation {
                    peer: ob.source,
                    detail: format!(
                        "sender declares {:?} cells, schedule expects {:?}",
                        sizes.cells(),
                        ob.counts
                    ),
                });
            }
            incoming[ri] = sizes;
            Ok(())
        },
    )?;

    // --- Preallocate the output --------------------------------------------
    let retained_points = count_retained_points(input, &schedule.retained)?;
    let total_points = retained_points + incoming.iter().map(|s| s.points()).sum::<usize>();
    let cell_totals: [usize; KIND_COUNT] = std::array::from_fn(|k| {
        schedule.retained[k] + incoming.iter().map(|s| s.cells()[k]).sum::<usize>()
    });
    let total_cells: usize = cell_totals.iter().sum();

    let mut out = Mesh::new();
    out.points.reserve(total_points);
    if input.is_structurally_empty() {
        for t in &template.cell_arrays {
            out.cell_data
                .push(Attribute::zeroed(&t.name, t.components, t.scalar, total_cells));
        }
        for t in &template.point_arrays {
            out.point_data
                .push(Attribute::zeroed(&t.name, t.components, t.scalar, total_points));
        }
    } else {
        for a in input.cell_data.iter() {
            out.cell_data.push(a.zeroed_like(total_cells));
        }
        for a in input.point_data.iter() {
            out.point_data.push(a.zeroed_like(total_points));
        }
    }
    let mut cursors = OutputCursors::new(cell_totals);

    // --- LOCAL_COPY --------------------------------------------------------
    debug!(
        "rank {my_rank}: retaining {:?} cells, {retained_points} points",
        schedule.retained
    );
    let mut dedup = PointDedup::new();
    copier::copy_cells(
        input,
        &mut out,
        &schedule.retained,
        None,
        &mut dedup,
        &mut cursors,
        fill,
    )?;

    // --- PAIRWISE_EXCHANGE -------------------------------------------------
    pairwise(
        my_rank,
        &send_peers,
        &recv_peers,
        |si| send_payload(input, &units[si], comm),
        |ri| {
            receive_merge(
                &mut out,
                schedule.recvs[ri].source,
                &incoming[ri],
                &mut cursors,
                comm,
                fill,
            )
        },
    )?;

    debug!(
        "rank {my_rank}: done, {} points / {} cells",
        out.points.len(),
        out.total_cells()
    );
    out.validate()?;
    Ok(out)
}

/// Transmit one send unit: connectivity, coordinates, then attributes in
/// tag order.
fn send_payload<C: Communicator>(
    input: &Mesh,
    unit: &SendUnit,
    comm: &C,
) -> Result<(), RedistError> {
    // Packed connectivity, kinds concatenated in declaration order.
    let total_words: usize = unit.conn.iter().map(|c| c.len()).sum();
    let mut conn = Vec::with_capacity(total_words);
    for k in 0..KIND_COUNT {
        conn.extend_from_slice(&unit.conn[k]);
    }
    comm.send(unit.dest, TAG_CELLS, cast_slice(&conn));

    let mut coords: Vec<f32> = Vec::with_capacity(unit.point_ids.len() * 3);
    for &pid in &unit.point_ids {
        coords.extend_from_slice(&input.points[pid as usize]);
    }
    comm.send(unit.dest, TAG_POINTS, cast_slice(&coords));

    for (i, attr) in input.point_data.iter().enumerate() {
        transfer::send_values(
            attr,
            &unit.point_ids,
            unit.dest,
            attr_tag(i, POINT_ATTR_SLOT),
            comm,
        )?;
    }
    for (i, attr) in input.cell_data.iter().enumerate() {
        for k in 0..KIND_COUNT {
            if unit.counts[k] == 0 {
                continue;
            }
            match (&unit.cell_ids, &unit.contiguous_from) {
                (Some(ids), _) => {
                    transfer::send_values(attr, &ids[k], unit.dest, attr_tag(i, k), comm)?;
                }
                (None, Some(from)) => {
                    transfer::send_block(
                        attr,
                        unit.counts[k],
                        from[k],
                        unit.dest,
                        attr_tag(i, k),
                        comm,
                    )?;
                }
                (None, None) => unreachable!("send unit has neither index list nor range"),
            }
        }
    }
    Ok(())
}

/// Receive one peer's payload and merge it into the output. Incoming
/// point ids are already deduplicated by the sender; merging only adds
/// the local point offset.
fn receive_merge<C: Communicator>(
    out: &mut Mesh,
    source: usize,
    sizes: &WireSizes,
    cursors: &mut OutputCursors,
    comm: &C,
    fill: Option<usize>,
) -> Result<(), RedistError> {
    let cells = sizes.cells();
    let conn_words = sizes.conn_words();
    let n_points = sizes.points();
    let point_base = out.points.len() as u32;

    let total_words: usize = conn_words.iter().sum();
    let bytes = comm
        .recv(source, TAG_CELLS, total_words * 4)
        .ok_or_else(|| comm_err(source, "missing connectivity payload".into()))?;
    expect_exact_len(bytes.len(), total_words * 4).map_err(|e| {
        RedistError::ScheduleSizeViolation {
            peer: source,
            detail: format!("connectivity: {e}"),
        }
    })?;
    let words: Vec<u32> = read_pod_vec(&bytes);

    let mut offset = 0;
    let mut remapped = Vec::new();
    for k in 0..KIND_COUNT {
        let segment = words[offset..offset + conn_words[k]].to_vec();
        offset += conn_words[k];
        let block = CellBlock::from_packed(segment, cells[k]).map_err(|e| {
            RedistError::ScheduleSizeViolation {
                peer: source,
                detail: format!("{:?} connectivity: {e}", CellKind::ALL[k]),
            }
        })?;
        for i in 0..block.len() {
            remapped.clear();
            for &pid in block.cell(i)? {
                if pid as usize >= n_points {
                    return Err(RedistError::BoundsViolation(format!(
                        "rank {source} sent cell referencing point {pid} of {n_points}"
                    )));
                }
                remapped.push(point_base + pid);
            }
            out.cells[k].push(&remapped);
        }
    }

    let bytes = comm
        .recv(source, TAG_POINTS, n_points * 12)
        .ok_or_else(|| comm_err(source, "missing coordinate payload".into()))?;
    expect_exact_len(bytes.len(), n_points * 12).map_err(|e| {
        RedistError::ScheduleSizeViolation {
            peer: source,
            detail: format!("coordinates: {e}"),
        }
    })?;
    let coords: Vec<f32> = read_pod_vec(&bytes);
    for c in coords.chunks_exact(3) {
        out.points.push([c[0], c[1], c[2]]);
    }

    for (i, attr) in out.point_data.arrays_mut().iter_mut().enumerate() {
        transfer::recv_values(
            attr,
            n_points,
            cursors.point,
            source,
            attr_tag(i, POINT_ATTR_SLOT),
            comm,
            fill,
        )?;
    }
    for (i, attr) in out.cell_data.arrays_mut().iter_mut().enumerate() {
        for k in 0..KIND_COUNT {
            if cells[k] == 0 {
                continue;
            }
            transfer::recv_values(
                attr,
                cells[k],
                cursors.kind_base[k] + cursors.cell[k],
                source,
                attr_tag(i, k),
                comm,
                fill,
            )?;
        }
    }

    for k in 0..KIND_COUNT {
        cursors.cell[k] += cells[k];
    }
    cursors.point += n_points;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redist::schedule::SendObligation;

    fn service_order(my_rank: usize, sends: &[usize], recvs: &[usize]) -> Vec<String> {
        let log = std::cell::RefCell::new(Vec::new());
        pairwise::<()>(
            my_rank,
            sends,
            recvs,
            |si| {
                log.borrow_mut().push(format!("s{si}"));
                Ok(())
            },
            |ri| {
                log.borrow_mut().push(format!("r{ri}"));
                Ok(())
            },
        )
        .unwrap();
        log.into_inner()
    }

    #[test]
    fn pairwise_services_ascending_peers() {
        // Peers in play: send 0, recv 2, send 3.
        assert_eq!(service_order(1, &[0, 3], &[2]), ["s0", "r0", "s1"]);
    }

    #[test]
    fn pairwise_tie_lower_rank_receives_first() {
        assert_eq!(service_order(0, &[1], &[1]), ["r0", "s0"]);
        assert_eq!(service_order(2, &[1], &[1]), ["s0", "r0"]);
    }

    #[test]
    fn send_units_consume_contiguous_ranges_in_order() {
        let mut mesh = Mesh::new();
        mesh.points = (0..8).map(|i| [i as f32, 0.0, 0.0]).collect();
        for i in 0..6u32 {
            mesh.cells_mut(CellKind::TriangleStrip).push(&[i, i + 1, i + 2]);
        }
        let schedule = Schedule {
            retained: [0, 0, 0, 2],
            sends: vec![
                SendObligation::range(1, [0, 0, 0, 1]),
                SendObligation::range(2, [0, 0, 0, 3]),
            ],
            recvs: vec![],
        };
        let units = build_send_units(&mesh, &schedule).unwrap();
        assert_eq!(units.len(), 2);
        // First send takes cell 2 (after the 2 retained): points 2,3,4.
        assert_eq!(units[0].point_ids, vec![2, 3, 4]);
        assert_eq!(units[0].conn[3], vec![3, 0, 1, 2]);
        // Second send takes cells 3..6.
        assert_eq!(units[1].counts, [0, 0, 0, 3]);
        assert_eq!(units[1].point_ids, vec![3, 4, 5, 6, 7]);
        assert_eq!(units[1].contiguous_from, Some([0, 0, 0, 3]));
    }

    #[test]
    fn send_units_reject_overrun() {
        let mut mesh = Mesh::new();
        mesh.points = vec![[0.0; 3]; 3];
        mesh.cells_mut(CellKind::Line).push(&[0, 1]);
        let schedule = Schedule {
            retained: [0, 1, 0, 0],
            sends: vec![SendObligation::range(1, [0, 1, 0, 0])],
            recvs: vec![],
        };
        assert!(matches!(
            build_send_units(&mesh, &schedule),
            Err(RedistError::BoundsViolation(_))
        ));
    }

    #[test]
    fn retained_point_count_deduplicates() {
        let mut mesh = Mesh::new();
        mesh.points = vec![[0.0; 3]; 5];
        mesh.cells_mut(CellKind::Polygon).push(&[0, 1, 2]);
        mesh.cells_mut(CellKind::Polygon).push(&[2, 3, 0]);
        assert_eq!(count_retained_points(&mesh, &[0, 0, 2, 0]).unwrap(), 4);
    }
}
