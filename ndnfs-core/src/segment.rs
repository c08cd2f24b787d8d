//! Segment arithmetic: split a byte range into offset-aligned segments and
//! copy segment payloads back into the caller's window.
//!
//! Boundaries depend only on the segment size, never on the requested
//! offset, so overlapping reads name the same segments and hit the same
//! cached Data.

use crate::namespace::MAX_PAYLOAD_SIZE;

/// Segment boundaries covering `[offset, offset + length)`.
pub fn segment_offsets(offset: u64, length: u64, segment_size: u64) -> Vec<u64> {
    let size = if segment_size == 0 {
        MAX_PAYLOAD_SIZE
    } else {
        segment_size
    };
    let end = offset.saturating_add(length);
    let mut out = Vec::new();
    let mut boundary = (offset / size) * size;
    while boundary < end {
        out.push(boundary);
        boundary = match boundary.checked_add(size) {
            Some(b) => b,
            None => break,
        };
    }
    out
}

/// Copy the part of a segment that overlaps the window starting at
/// `window_offset` into `buf`. Returns the number of bytes copied.
pub fn place(buf: &mut [u8], window_offset: u64, segment_offset: u64, payload: &[u8]) -> usize {
    let (src, dst) = if segment_offset < window_offset {
        // leading segment: skip the bytes before the window
        let skip = window_offset - segment_offset;
        if skip >= payload.len() as u64 {
            return 0;
        }
        (&payload[skip as usize..], 0usize)
    } else {
        let at = segment_offset - window_offset;
        if at >= buf.len() as u64 {
            return 0;
        }
        (payload, at as usize)
    };
    let n = src.len().min(buf.len() - dst);
    buf[dst..dst + n].copy_from_slice(&src[..n]);
    n
}
