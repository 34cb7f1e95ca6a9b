//! In-place sample container compaction.

use crate::config::SampleEncoding;

/// Compacts 24-in-32 audio in place and returns the packed length.
///
/// Each 4-byte input group is one container: a padding byte followed by the
/// 3 payload bytes of the sample. The payload bytes are moved down so the
/// output is a contiguous run of 3-byte samples at the front of `buf`.
///
/// The pass runs forward, and every destination index is strictly below the
/// index it reads from, so input and output may alias within the same
/// buffer. `len` must be a multiple of 4; trailing bytes beyond the last
/// whole group are ignored.
pub fn repack_24_in_32(buf: &mut [u8], len: usize) -> usize {
    let groups = len.min(buf.len()) / 4;
    for i in 0..groups {
        // dst 3i..3i+3 always precedes src 4i+1..4i+4.
        buf.copy_within(4 * i + 1..4 * i + 4, 3 * i);
    }
    groups * 3
}

/// Repacks one transfer chunk according to the encoding.
///
/// A no-op for encodings whose container already matches the wire format;
/// returns the number of bytes to transmit.
pub fn repack_chunk(encoding: SampleEncoding, buf: &mut [u8], len: usize) -> usize {
    if encoding.needs_repack() {
        repack_24_in_32(buf, len)
    } else {
        len
    }
}
