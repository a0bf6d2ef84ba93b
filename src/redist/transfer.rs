//! Type-generic movement of attribute tuples: within a rank (gather or
//! contiguous block copy) and between ranks (gather → send, receive →
//! scatter).
//!
//! Type dispatch happens once per array via `with_scalar_type!`; packed
//! bit arrays cannot be serialized and abort the call. Fill-rank mode
//! substitutes the owning rank id for the transferred values, and only
//! double-precision arrays are eligible for the substitution.

use crate::comm::Communicator;
use crate::error::RedistError;
use crate::mesh::attributes::{Attribute, Scalar, ScalarType, with_scalar_type};
use crate::redist::wire::{cast_slice, cast_slice_mut, expect_exact_len};

fn unsupported(attr: &Attribute) -> RedistError {
    RedistError::UnsupportedAttributeType {
        name: attr.name.clone(),
        scalar: attr.scalar_type(),
    }
}

fn mismatch(name: &str) -> RedistError {
    RedistError::AttributeTypeMismatch {
        name: name.to_string(),
    }
}

fn check_shapes(src: &Attribute, dst: &Attribute) -> Result<(), RedistError> {
    if src.scalar_type() != dst.scalar_type() || src.components != dst.components {
        return Err(mismatch(&src.name));
    }
    Ok(())
}

/// True when fill-rank substitution applies to this array.
fn fill_applies(scalar: ScalarType, fill_rank: Option<usize>) -> bool {
    fill_rank.is_some() && scalar == ScalarType::F64
}

/// `dst[to_offset + i] = src[from[i]]` for all components, for
/// `i in [0, from.len())`. In fill-rank mode every written component is
/// the owning rank id instead.
pub fn copy_values(
    src: &Attribute,
    dst: &mut Attribute,
    from: &[u32],
    to_offset: usize,
    fill_rank: Option<usize>,
) -> Result<(), RedistError> {
    check_shapes(src, dst)?;
    let comps = src.components;
    with_scalar_type!(
        src.scalar_type(),
        T => {
            let s = T::slice(&src.data).ok_or_else(|| mismatch(&src.name))?;
            let d = T::slice_mut(&mut dst.data).ok_or_else(|| mismatch(&dst.name))?;
            let out = checked_window(d, to_offset, from.len(), comps, &dst.name)?;
            if fill_applies(T::TYPE, fill_rank) {
                out.fill(T::from_rank(fill_rank.unwrap_or(0)));
                return Ok(());
            }
            for (i, &orig) in from.iter().enumerate() {
                let o = orig as usize;
                let tuple = s.get(o * comps..(o + 1) * comps).ok_or_else(|| {
                    RedistError::BoundsViolation(format!(
                        "attribute `{}`: tuple {o} of {}",
                        src.name,
                        s.len() / comps.max(1)
                    ))
                })?;
                out[i * comps..(i + 1) * comps].copy_from_slice(tuple);
            }
            Ok(())
        },
        Err(unsupported(src)),
    )
}

/// Contiguous-range variant of [`copy_values`]: copies `count` tuples
/// from `src[from_offset..]` to `dst[to_offset..]` without an index list.
pub fn copy_block(
    src: &Attribute,
    dst: &mut Attribute,
    count: usize,
    from_offset: usize,
    to_offset: usize,
    fill_rank: Option<usize>,
) -> Result<(), RedistError> {
    check_shapes(src, dst)?;
    let comps = src.components;
    with_scalar_type!(
        src.scalar_type(),
        T => {
            let s = T::slice(&src.data).ok_or_else(|| mismatch(&src.name))?;
            let d = T::slice_mut(&mut dst.data).ok_or_else(|| mismatch(&dst.name))?;
            let input = checked_window_ref(s, from_offset, count, comps, &src.name)?;
            let out = checked_window(d, to_offset, count, comps, &dst.name)?;
            if fill_applies(T::TYPE, fill_rank) {
                out.fill(T::from_rank(fill_rank.unwrap_or(0)));
            } else {
                out.copy_from_slice(input);
            }
            Ok(())
        },
        Err(unsupported(src)),
    )
}

/// Gather `from.len()` tuples through the index list and send them to
/// `peer` in one blocking message.
pub fn send_values<C: Communicator>(
    src: &Attribute,
    from: &[u32],
    peer: usize,
    tag: u16,
    comm: &C,
) -> Result<(), RedistError> {
    let comps = src.components;
    with_scalar_type!(
        src.scalar_type(),
        T => {
            let s = T::slice(&src.data).ok_or_else(|| mismatch(&src.name))?;
            let mut buf: Vec<T> = Vec::with_capacity(from.len() * comps);
            for &orig in from {
                let o = orig as usize;
                let tuple = s.get(o * comps..(o + 1) * comps).ok_or_else(|| {
                    RedistError::BoundsViolation(format!(
                        "attribute `{}`: tuple {o} of {}",
                        src.name,
                        s.len() / comps.max(1)
                    ))
                })?;
                buf.extend_from_slice(tuple);
            }
            comm.send(peer, tag, cast_slice(&buf));
            Ok(())
        },
        Err(unsupported(src)),
    )
}

/// Send `count` contiguous tuples starting at `from_offset` directly from
/// the source storage, skipping the gather allocation.
pub fn send_block<C: Communicator>(
    src: &Attribute,
    count: usize,
    from_offset: usize,
    peer: usize,
    tag: u16,
    comm: &C,
) -> Result<(), RedistError> {
    let comps = src.components;
    with_scalar_type!(
        src.scalar_type(),
        T => {
            let s = T::slice(&src.data).ok_or_else(|| mismatch(&src.name))?;
            let input = checked_window_ref(s, from_offset, count, comps, &src.name)?;
            comm.send(peer, tag, cast_slice(input));
            Ok(())
        },
        Err(unsupported(src)),
    )
}

/// Blocking receive of `count` tuples from `peer`, scattered into `dst`
/// starting at tuple `to_offset`. A payload of any other size is a
/// protocol violation: the two ranks disagree about the schedule.
pub fn recv_values<C: Communicator>(
    dst: &mut Attribute,
    count: usize,
    to_offset: usize,
    peer: usize,
    tag: u16,
    comm: &C,
    fill_rank: Option<usize>,
) -> Result<(), RedistError> {
    let comps = dst.components;
    with_scalar_type!(
        dst.scalar_type(),
        T => {
            let expected = count * comps * std::mem::size_of::<T>();
            let data = comm.recv(peer, tag, expected).ok_or_else(|| RedistError::CommError {
                neighbor: peer,
                detail: format!("no payload for attribute `{}`", dst.name),
            })?;
            expect_exact_len(data.len(), expected).map_err(|detail| {
                RedistError::ScheduleSizeViolation {
                    peer,
                    detail: format!("attribute `{}`: {detail}", dst.name),
                }
            })?;
            let d = T::slice_mut(&mut dst.data).ok_or_else(|| mismatch(&dst.name))?;
            let out = checked_window(d, to_offset, count, comps, &dst.name)?;
            if fill_applies(T::TYPE, fill_rank) {
                out.fill(T::from_rank(fill_rank.unwrap_or(0)));
            } else {
                // The received Vec<u8> carries no alignment guarantee, so
                // fill through the destination's byte view rather than
                // casting the payload up to `&[T]`.
                cast_slice_mut(out).copy_from_slice(&data);
            }
            Ok(())
        },
        Err(unsupported(dst)),
    )
}

fn checked_window<'a, T: Scalar>(
    data: &'a mut [T],
    offset: usize,
    count: usize,
    comps: usize,
    name: &str,
) -> Result<&'a mut [T], RedistError> {
    let total = if comps == 0 { 0 } else { data.len() / comps };
    data.get_mut(offset * comps..(offset + count) * comps)
        .ok_or_else(|| {
            RedistError::BoundsViolation(format!(
                "attribute `{name}`: tuples {offset}..{} of preallocated {total}",
                offset + count
            ))
        })
}

fn checked_window_ref<'a, T: Scalar>(
    data: &'a [T],
    offset: usize,
    count: usize,
    comps: usize,
    name: &str,
) -> Result<&'a [T], RedistError> {
    data.get(offset * comps..(offset + count) * comps)
        .ok_or_else(|| {
            RedistError::BoundsViolation(format!(
                "attribute `{name}`: tuples {offset}..{} of {}",
                offset + count,
                if comps == 0 { 0 } else { data.len() / comps }
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{NoComm, ThreadComm};
    use crate::mesh::attributes::AttributeData;

    fn f64_attr(values: &[f64]) -> Attribute {
        Attribute::new("t", 1, AttributeData::F64(values.to_vec()))
    }

    #[test]
    fn copy_values_gathers_through_index_list() {
        let src = f64_attr(&[10.0, 11.0, 12.0, 13.0]);
        let mut dst = src.zeroed_like(3);
        copy_values(&src, &mut dst, &[3, 0, 2], 0, None).unwrap();
        assert_eq!(dst.data, AttributeData::F64(vec![13.0, 10.0, 12.0]));
    }

    #[test]
    fn copy_values_respects_destination_offset() {
        let src = Attribute::new("v", 2, AttributeData::I32(vec![1, 2, 3, 4]));
        let mut dst = src.zeroed_like(3);
        copy_values(&src, &mut dst, &[1], 2, None).unwrap();
        assert_eq!(dst.data, AttributeData::I32(vec![0, 0, 0, 0, 3, 4]));
    }

    #[test]
    fn copy_block_contiguous() {
        let src = f64_attr(&[1.0, 2.0, 3.0, 4.0]);
        let mut dst = src.zeroed_like(2);
        copy_block(&src, &mut dst, 2, 1, 0, None).unwrap();
        assert_eq!(dst.data, AttributeData::F64(vec![2.0, 3.0]));
    }

    #[test]
    fn fill_rank_applies_to_f64_only() {
        let src = f64_attr(&[1.0, 2.0]);
        let mut dst = src.zeroed_like(2);
        copy_values(&src, &mut dst, &[0, 1], 0, Some(3)).unwrap();
        assert_eq!(dst.data, AttributeData::F64(vec![3.0, 3.0]));

        let src_i = Attribute::new("i", 1, AttributeData::I32(vec![5, 6]));
        let mut dst_i = src_i.zeroed_like(2);
        copy_values(&src_i, &mut dst_i, &[0, 1], 0, Some(3)).unwrap();
        // Non-double array: values copied, not substituted.
        assert_eq!(dst_i.data, AttributeData::I32(vec![5, 6]));
    }

    #[test]
    fn bit_arrays_are_fatal() {
        let src = Attribute::new("mask", 1, AttributeData::Bit(vec![0xFF]));
        let mut dst = src.clone();
        assert!(matches!(
            copy_values(&src, &mut dst, &[0], 0, None),
            Err(RedistError::UnsupportedAttributeType { .. })
        ));
        assert!(matches!(
            send_values(&src, &[0], 0, 200, &NoComm),
            Err(RedistError::UnsupportedAttributeType { .. })
        ));
    }

    #[test]
    fn type_mismatch_is_surfaced() {
        let src = f64_attr(&[1.0]);
        let mut dst = Attribute::new("t", 1, AttributeData::F32(vec![0.0]));
        assert!(matches!(
            copy_values(&src, &mut dst, &[0], 0, None),
            Err(RedistError::AttributeTypeMismatch { .. })
        ));
    }

    #[test]
    fn gather_rejects_out_of_range_index() {
        let src = f64_attr(&[1.0, 2.0]);
        let mut dst = src.zeroed_like(1);
        assert!(matches!(
            copy_values(&src, &mut dst, &[5], 0, None),
            Err(RedistError::BoundsViolation(_))
        ));
    }

    #[test]
    fn send_recv_roundtrip() {
        let world = ThreadComm::world(2);
        let src = Attribute::new("v", 2, AttributeData::U16(vec![1, 2, 3, 4, 5, 6]));
        send_values(&src, &[2, 0], 1, 230, &world[0]).unwrap();
        let mut dst = src.zeroed_like(2);
        recv_values(&mut dst, 2, 0, 0, 230, &world[1], None).unwrap();
        assert_eq!(dst.data, AttributeData::U16(vec![5, 6, 1, 2]));
    }

    #[test]
    fn send_block_recv_with_offset() {
        let world = ThreadComm::world(2);
        let src = f64_attr(&[0.5, 1.5, 2.5]);
        send_block(&src, 2, 1, 1, 231, &world[0]).unwrap();
        let mut dst = src.zeroed_like(4);
        recv_values(&mut dst, 2, 2, 0, 231, &world[1], None).unwrap();
        assert_eq!(dst.data, AttributeData::F64(vec![0.0, 0.0, 1.5, 2.5]));
    }

    #[test]
    fn short_payload_is_schedule_violation() {
        let world = ThreadComm::world(2);
        // Sender ships 1 tuple; receiver expects 2.
        let src = f64_attr(&[9.0]);
        send_block(&src, 1, 0, 1, 232, &world[0]).unwrap();
        let mut dst = src.zeroed_like(2);
        assert!(matches!(
            recv_values(&mut dst, 2, 0, 0, 232, &world[1], None),
            Err(RedistError::ScheduleSizeViolation { peer: 0, .. })
        ));
    }
}
