//! Delta compression between similar objects.
//!
//! A delta is a copy/insert instruction stream:
//!
//! ```text
//! varint  base length
//! varint  target length
//! 1xxxxxxx [offset bytes] [size bytes]   copy from base
//!          bits 0-3 select which little-endian offset bytes follow,
//!          bits 4-6 select which size bytes follow (size 0 means 0x10000)
//! 0nnnnnnn <n literal bytes>             insert, n in 1..=127
//! ```

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Block size used to index the base object.
const BLOCK_SIZE: usize = 16;

/// Maximum literal run a single insert instruction can carry.
const MAX_INSERT: usize = 0x7f;

/// Maximum length a single copy instruction can carry.
const MAX_COPY: usize = 0x00ff_ffff;

/// Candidate base offsets examined per block before giving up.
const MAX_CANDIDATES: usize = 16;

/// Strategy for proposing an edit script from a base object to a target.
///
/// The pack format only stores the resulting bytes, so strategies can change
/// without affecting readers as long as they emit the instruction stream
/// understood by [`apply_delta`].
pub trait DeltaStrategy {
    /// Propose an edit script turning `base` into `target`, or `None` if this
    /// strategy finds nothing worth encoding.
    fn propose_delta(&self, base: &[u8], target: &[u8]) -> Option<Vec<u8>>;
}

/// Greedy block-matching strategy.
///
/// Indexes the base at block-aligned offsets, then scans the target for the
/// longest match at each position, falling back to literal inserts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyInsertDelta;

impl DeltaStrategy for CopyInsertDelta {
    fn propose_delta(&self, base: &[u8], target: &[u8]) -> Option<Vec<u8>> {
        if base.len() < BLOCK_SIZE || target.len() < BLOCK_SIZE || base.len() > u32::MAX as usize
        {
            return None;
        }

        let mut blocks: HashMap<&[u8], Vec<usize>> = HashMap::new();
        for offset in (0..=base.len() - BLOCK_SIZE).step_by(BLOCK_SIZE) {
            blocks
                .entry(&base[offset..offset + BLOCK_SIZE])
                .or_default()
                .push(offset);
        }

        let mut out = Vec::new();
        write_varint(&mut out, base.len() as u64);
        write_varint(&mut out, target.len() as u64);

        let mut pending: Vec<u8> = Vec::new();
        let mut copied_any = false;
        let mut pos = 0;

        while pos < target.len() {
            let best = if pos + BLOCK_SIZE <= target.len() {
                blocks
                    .get(&target[pos..pos + BLOCK_SIZE])
                    .and_then(|offsets| longest_match(base, target, pos, offsets))
            } else {
                None
            };

            match best {
                Some((base_offset, len)) => {
                    flush_inserts(&mut out, &mut pending);
                    emit_copy(&mut out, base_offset, len);
                    copied_any = true;
                    pos += len;
                }
                None => {
                    pending.push(target[pos]);
                    pos += 1;
                }
            }
        }
        flush_inserts(&mut out, &mut pending);

        copied_any.then_some(out)
    }
}

/// Pick the candidate offset that matches the longest run starting at `pos`.
fn longest_match(
    base: &[u8],
    target: &[u8],
    pos: usize,
    offsets: &[usize],
) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for &offset in offsets.iter().take(MAX_CANDIDATES) {
        let len = base[offset..]
            .iter()
            .zip(&target[pos..])
            .take_while(|(a, b)| a == b)
            .count();
        if len >= BLOCK_SIZE && best.is_none_or(|(_, best_len)| len > best_len) {
            best = Some((offset, len));
        }
    }
    best
}

fn flush_inserts(out: &mut Vec<u8>, pending: &mut Vec<u8>) {
    for chunk in pending.chunks(MAX_INSERT) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    pending.clear();
}

fn emit_copy(out: &mut Vec<u8>, mut offset: usize, mut len: usize) {
    while len > 0 {
        let size = len.min(MAX_COPY);
        let mut op = 0x80u8;
        let mut args = Vec::with_capacity(7);

        for i in 0..4 {
            let byte = ((offset >> (8 * i)) & 0xff) as u8;
            if byte != 0 {
                op |= 1 << i;
                args.push(byte);
            }
        }
        for i in 0..3 {
            let byte = ((size >> (8 * i)) & 0xff) as u8;
            if byte != 0 {
                op |= 1 << (4 + i);
                args.push(byte);
            }
        }

        out.push(op);
        out.extend_from_slice(&args);
        offset += size;
        len -= size;
    }
}

/// Apply an edit script to `base`, reconstructing the target bytes.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let base_len = read_varint(delta, &mut pos)?;
    let target_len = read_varint(delta, &mut pos)?;

    if base_len != base.len() as u64 {
        return Err(Error::invalid_delta(format!(
            "Base length mismatch: delta expects {}, base has {}",
            base_len,
            base.len()
        )));
    }

    // No instruction yields more than MAX_COPY bytes per byte it occupies.
    let max_target = ((delta.len() - pos) as u64).saturating_mul(MAX_COPY as u64);
    if target_len > max_target {
        return Err(Error::invalid_delta(format!(
            "Target length {} exceeds what {} instruction bytes can produce",
            target_len,
            delta.len() - pos
        )));
    }

    let capacity = target_len.min((base.len() + delta.len()) as u64) as usize;
    let mut out = Vec::with_capacity(capacity);
    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;

        if op & 0x80 != 0 {
            let mut offset = 0usize;
            for i in 0..4 {
                if op & (1 << i) != 0 {
                    offset |= (next_byte(delta, &mut pos)? as usize) << (8 * i);
                }
            }
            let mut size = 0usize;
            for i in 0..3 {
                if op & (1 << (4 + i)) != 0 {
                    size |= (next_byte(delta, &mut pos)? as usize) << (8 * i);
                }
            }
            if size == 0 {
                size = 0x10000;
            }

            let end = offset
                .checked_add(size)
                .filter(|end| *end <= base.len())
                .ok_or_else(|| {
                    Error::invalid_delta(format!(
                        "Copy {}+{} out of bounds for base of {} bytes",
                        offset,
                        size,
                        base.len()
                    ))
                })?;
            out.extend_from_slice(&base[offset..end]);
        } else if op != 0 {
            let len = op as usize;
            let literal = delta.get(pos..pos + len).ok_or_else(|| {
                Error::invalid_delta(format!("Insert of {} bytes truncated", len))
            })?;
            out.extend_from_slice(literal);
            pos += len;
        } else {
            return Err(Error::invalid_delta("Reserved instruction 0x00"));
        }

        if out.len() as u64 > target_len {
            return Err(Error::invalid_delta(format!(
                "Output exceeds target length {}",
                target_len
            )));
        }
    }

    if out.len() as u64 != target_len {
        return Err(Error::invalid_delta(format!(
            "Target length mismatch: expected {}, produced {}",
            target_len,
            out.len()
        )));
    }

    Ok(out)
}

fn next_byte(data: &[u8], pos: &mut usize) -> Result<u8> {
    let byte = *data
        .get(*pos)
        .ok_or_else(|| Error::invalid_delta("Unexpected end of delta"))?;
    *pos += 1;
    Ok(byte)
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = next_byte(data, pos)?;
        if shift > 63 {
            return Err(Error::invalid_delta("Length varint overflows 64 bits"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ (i >> 7) as u8)
            .collect()
    }

    #[test]
    fn test_small_edit_produces_small_delta() {
        let base = sample(4096, 1);
        let mut target = base.clone();
        target[2000..2010].copy_from_slice(b"0123456789");

        let delta = CopyInsertDelta.propose_delta(&base, &target).unwrap();
        assert!(delta.len() < 64, "delta was {} bytes", delta.len());
        assert_eq!(apply_delta(&base, &delta).unwrap(), target);
    }

    #[test]
    fn test_appended_content() {
        let base = b"The quick brown fox jumps over the lazy dog. ".repeat(8);
        let mut target = base.clone();
        target.extend_from_slice(b"And then some more text at the end.");

        let delta = CopyInsertDelta.propose_delta(&base, &target).unwrap();
        assert_eq!(apply_delta(&base, &delta).unwrap(), target);
        assert!(delta.len() < target.len());
    }

    #[test]
    fn test_unrelated_content_has_no_delta() {
        let base = vec![0xAAu8; 256];
        let target = vec![0x55u8; 256];
        assert!(CopyInsertDelta.propose_delta(&base, &target).is_none());
    }

    #[test]
    fn test_tiny_inputs_skipped() {
        assert!(CopyInsertDelta.propose_delta(b"short", b"shorter").is_none());
    }

    #[test]
    fn test_apply_rejects_wrong_base() {
        let base = sample(512, 7);
        let delta = CopyInsertDelta.propose_delta(&base, &base).unwrap();
        let err = apply_delta(&base[..100], &delta).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Corruption);
    }

    #[test]
    fn test_apply_rejects_out_of_bounds_copy() {
        // base_len=4, target_len=8, copy offset 0 size 8
        let delta = [4u8, 8, 0x80 | 0x10, 8];
        assert!(apply_delta(b"abcd", &delta).is_err());
    }

    #[test]
    fn test_apply_rejects_truncated_insert() {
        let delta = [0u8, 5, 5, b'a', b'b'];
        assert!(apply_delta(b"", &delta).is_err());
    }

    #[test]
    fn test_apply_rejects_reserved_op() {
        let delta = [0u8, 0, 0];
        assert!(apply_delta(b"", &delta).is_err());
    }

    #[test]
    fn test_apply_rejects_impossible_target_length() {
        let mut delta = vec![0u8];
        write_varint(&mut delta, 0x7fff_ffff_ffff_ffff);
        let err = apply_delta(b"", &delta).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Corruption);

        // Two instruction bytes cannot yield three maximal copies.
        let mut delta = vec![4u8];
        write_varint(&mut delta, 3 * MAX_COPY as u64);
        delta.extend_from_slice(&[0x80 | 0x10, 4]);
        let err = apply_delta(b"abcd", &delta).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_apply_allows_large_single_copy() {
        // op plus the high size byte: copy 0x100000 bytes from offset 0
        let base = vec![7u8; 0x10_0000];
        let mut delta = Vec::new();
        write_varint(&mut delta, base.len() as u64);
        write_varint(&mut delta, base.len() as u64);
        delta.extend_from_slice(&[0x80 | 0x40, 0x10]);
        assert_eq!(apply_delta(&base, &delta).unwrap(), base);
    }

    #[test]
    fn test_apply_rejects_output_past_target_length() {
        // target_len=2 but the copy yields 4 bytes
        let delta = [4u8, 2, 0x80 | 0x10, 4];
        assert!(apply_delta(b"abcd", &delta).is_err());
    }

    #[test]
    fn test_varint_multi_byte() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);
        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 300);
        assert_eq!(pos, 2);
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Whatever delta is proposed reconstructs the target exactly
        #[test]
        fn prop_apply_reconstructs_target(
            base in prop::collection::vec(any::<u8>(), 16..2048),
            edits in prop::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 0..16),
            tail in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut target = base.clone();
            for (idx, byte) in edits {
                let i = idx.index(target.len());
                target[i] = byte;
            }
            target.extend_from_slice(&tail);

            if let Some(delta) = CopyInsertDelta.propose_delta(&base, &target) {
                prop_assert_eq!(apply_delta(&base, &delta)?, target);
            }
        }
    }
}
