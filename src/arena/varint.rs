/// Largest header the arena ever writes (a u32-sized length).
pub const MAX_HEADER_LEN: usize = 5;

/// Longest encoding of a u64.
const MAX_VARINT_LEN64: usize = 10;

/// Total bytes a payload of `length` bytes occupies in the arena.
///
/// The thresholds are chosen so that `header + length` still encodes in
/// `header` bytes.
#[inline]
pub fn needed_size(length: usize) -> usize {
    let header = match length {
        0..=126 => 1,
        127..=16_381 => 2,
        16_382..=2_097_148 => 3,
        2_097_149..=268_435_451 => 4,
        _ => 5,
    };
    header + length
}

/// Encode `value` into `buf`, returning the number of bytes written.
#[inline]
pub fn put_uvarint(buf: &mut [u8], mut value: u64) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

/// Decode a varint from the start of `buf`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// input is truncated or overflows a u64.
#[inline]
pub fn uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate().take(MAX_VARINT_LEN64) {
        if byte < 0x80 {
            if i == MAX_VARINT_LEN64 - 1 && byte > 1 {
                return None;
            }
            return Some((value | (byte as u64) << shift, i + 1));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }
    None
}
