/// Record encoding stored inside arena frames.
///
/// Layout (all integers little-endian):
///   [timestamp: u64][key_hash: u64][key_len: u16][key bytes][value bytes]
///
/// A record whose `key_hash` is 0 has been superseded or deleted while its
/// bytes still sit in the arena.
use std::borrow::Cow;

pub const TIMESTAMP_SIZE: usize = 8;
pub const HASH_SIZE: usize = 8;
pub const KEY_LEN_SIZE: usize = 2;
pub const HEADERS_SIZE: usize = TIMESTAMP_SIZE + HASH_SIZE + KEY_LEN_SIZE;

/// Longest key the 2-byte length field can describe.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

const HASH_OFFSET: usize = TIMESTAMP_SIZE;
const KEY_LEN_OFFSET: usize = TIMESTAMP_SIZE + HASH_SIZE;

#[inline(always)]
fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

#[inline(always)]
fn key_len(frame: &[u8]) -> usize {
    u16::from_le_bytes([frame[KEY_LEN_OFFSET], frame[KEY_LEN_OFFSET + 1]]) as usize
}

/// Serialize a record into `buffer`, reusing its allocation.
///
/// `key` must be at most [`MAX_KEY_LEN`] bytes; callers check this first.
pub fn encode<'a>(
    buffer: &'a mut Vec<u8>,
    timestamp: u64,
    hash: u64,
    key: &str,
    value: &[u8],
) -> &'a [u8] {
    debug_assert!(key.len() <= MAX_KEY_LEN);
    buffer.clear();
    buffer.reserve(HEADERS_SIZE + key.len() + value.len());
    buffer.extend_from_slice(&timestamp.to_le_bytes());
    buffer.extend_from_slice(&hash.to_le_bytes());
    buffer.extend_from_slice(&(key.len() as u16).to_le_bytes());
    buffer.extend_from_slice(key.as_bytes());
    buffer.extend_from_slice(value);
    buffer
}

/// Build a copy of `frame` with a fresh timestamp and `value` appended to
/// the stored value. Hash and key are carried over untouched.
pub fn append_value<'a>(
    buffer: &'a mut Vec<u8>,
    timestamp: u64,
    frame: &[u8],
    value: &[u8],
) -> &'a [u8] {
    buffer.clear();
    buffer.reserve(frame.len() + value.len());
    buffer.extend_from_slice(&timestamp.to_le_bytes());
    buffer.extend_from_slice(&frame[TIMESTAMP_SIZE..]);
    buffer.extend_from_slice(value);
    buffer
}

/// True if `frame` is long enough to hold a record.
///
/// Filler frames written while the arena re-linearizes fail this check.
#[inline]
pub fn is_record(frame: &[u8]) -> bool {
    frame.len() >= HEADERS_SIZE && frame.len() >= HEADERS_SIZE + key_len(frame)
}

#[inline]
pub fn decode_timestamp(frame: &[u8]) -> u64 {
    read_u64(frame)
}

#[inline]
pub fn decode_hash(frame: &[u8]) -> u64 {
    read_u64(&frame[HASH_OFFSET..])
}

/// Raw key bytes, borrowed from the frame.
#[inline]
pub fn key_bytes(frame: &[u8]) -> &[u8] {
    &frame[HEADERS_SIZE..HEADERS_SIZE + key_len(frame)]
}

/// Key as text. Borrowed unless the stored bytes are not valid UTF-8.
pub fn decode_key(frame: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(key_bytes(frame))
}

/// Value bytes, copied out so the result outlives later arena writes.
pub fn decode_value(frame: &[u8]) -> Vec<u8> {
    value_bytes(frame).to_vec()
}

#[inline]
fn value_bytes(frame: &[u8]) -> &[u8] {
    &frame[HEADERS_SIZE + key_len(frame)..]
}

/// Compare the stored key with `key` without decoding it.
#[inline]
pub fn key_matches(frame: &[u8], key: &str) -> bool {
    key_bytes(frame) == key.as_bytes()
}

/// Tombstone a record in place.
#[inline]
pub fn zero_hash(frame: &mut [u8]) {
    frame[HASH_OFFSET..HASH_OFFSET + HASH_SIZE].fill(0);
}

/// Borrowed view over one record.
///
/// The view borrows the arena, so it cannot outlive the shard lock guard
/// the frame was read under.
#[derive(Clone, Copy)]
pub struct EntryView<'a> {
    frame: &'a [u8],
}

impl<'a> EntryView<'a> {
    /// Wrap `frame`, or `None` if it is not a record (e.g. filler).
    pub fn parse(frame: &'a [u8]) -> Option<Self> {
        is_record(frame).then_some(EntryView { frame })
    }

    pub fn timestamp(&self) -> u64 {
        decode_timestamp(self.frame)
    }

    pub fn hash(&self) -> u64 {
        decode_hash(self.frame)
    }

    pub fn key(&self) -> Cow<'a, str> {
        decode_key(self.frame)
    }

    pub fn value(&self) -> &'a [u8] {
        value_bytes(self.frame)
    }

    /// True once the record has been superseded or deleted.
    pub fn is_tombstoned(&self) -> bool {
        self.hash() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_lays_out_header_key_value() {
        let mut buffer = Vec::new();
        let frame = encode(&mut buffer, 1_234_567_890, 9_876_543_210, "testkey", b"testvalue");

        assert_eq!(frame.len(), HEADERS_SIZE + 7 + 9);
        assert_eq!(decode_timestamp(frame), 1_234_567_890);
        assert_eq!(decode_hash(frame), 9_876_543_210);
        assert_eq!(decode_key(frame), "testkey");
        assert_eq!(decode_value(frame), b"testvalue");
    }

    #[test]
    fn encode_reuses_buffer() {
        let mut buffer = Vec::with_capacity(256);
        encode(&mut buffer, 1, 1, "a-much-longer-key", &[7; 100]);
        let short = encode(&mut buffer, 2, 2, "k", b"v").to_vec();

        assert_eq!(short.len(), HEADERS_SIZE + 2);
        assert_eq!(decode_key(&short), "k");
        assert!(buffer.capacity() >= 256);
    }

    #[test]
    fn append_value_keeps_hash_and_key() {
        let mut first = Vec::new();
        let frame = encode(&mut first, 1_234_567_890, 9_876_543_210, "testkey", b"testvalue1").to_vec();

        let mut second = Vec::new();
        let appended = append_value(&mut second, 1_234_567_891, &frame, b"testvalue2");

        assert_eq!(appended.len(), frame.len() + 10);
        assert_eq!(decode_timestamp(appended), 1_234_567_891);
        assert_eq!(decode_hash(appended), 9_876_543_210);
        assert_eq!(decode_key(appended), "testkey");
        assert_eq!(decode_value(appended), b"testvalue1testvalue2");
    }

    #[test]
    fn empty_key_and_value() {
        let mut buffer = Vec::new();
        let frame = encode(&mut buffer, 0, 42, "", b"");

        assert!(is_record(frame));
        assert_eq!(decode_key(frame), "");
        assert!(decode_value(frame).is_empty());
    }

    #[test]
    fn key_matches_compares_exactly() {
        let mut buffer = Vec::new();
        let frame = encode(&mut buffer, 0, 1, "key", b"value");

        assert!(key_matches(frame, "key"));
        assert!(!key_matches(frame, "ke"));
        assert!(!key_matches(frame, "key2"));
        assert!(!key_matches(frame, "KEY"));
    }

    #[test]
    fn zero_hash_only_touches_hash() {
        let mut buffer = Vec::new();
        let mut frame = encode(&mut buffer, 77, 0xdead_beef, "key", b"value").to_vec();

        zero_hash(&mut frame);

        assert_eq!(decode_hash(&frame), 0);
        assert_eq!(decode_timestamp(&frame), 77);
        assert_eq!(decode_key(&frame), "key");
        assert_eq!(decode_value(&frame), b"value");
        assert!(EntryView::parse(&frame).unwrap().is_tombstoned());
    }

    #[test]
    fn decoded_value_is_an_independent_copy() {
        let mut buffer = Vec::new();
        let mut frame = encode(&mut buffer, 0, 1, "k", b"abc").to_vec();
        let value = decode_value(&frame);

        frame.iter_mut().for_each(|b| *b = 0xff);
        assert_eq!(value, b"abc");
    }

    #[test]
    fn filler_is_not_a_record() {
        assert!(!is_record(&[]));
        assert!(!is_record(&[0; HEADERS_SIZE - 1]));
        assert!(is_record(&[0; HEADERS_SIZE]));
        assert!(EntryView::parse(&[0; 4]).is_none());

        // key_len claims more bytes than the frame holds
        let mut frame = [0u8; HEADERS_SIZE + 1];
        frame[KEY_LEN_OFFSET] = 5;
        assert!(!is_record(&frame));
    }

    #[test]
    fn view_borrows_fields() {
        let mut buffer = Vec::new();
        let frame = encode(&mut buffer, 5, 6, "key", b"value");
        let view = EntryView::parse(frame).unwrap();

        assert_eq!(view.timestamp(), 5);
        assert_eq!(view.hash(), 6);
        assert_eq!(view.key(), "key");
        assert_eq!(view.value(), b"value");
        assert!(!view.is_tombstoned());
    }

    proptest! {
        #[test]
        fn decode_recovers_every_field(
            timestamp in any::<u64>(),
            hash in any::<u64>(),
            key in ".{0,64}",
            value in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let mut buffer = Vec::new();
            let frame = encode(&mut buffer, timestamp, hash, &key, &value);

            prop_assert_eq!(decode_timestamp(frame), timestamp);
            prop_assert_eq!(decode_hash(frame), hash);
            prop_assert_eq!(decode_key(frame), key.as_str());
            prop_assert_eq!(decode_value(frame), value);
        }
    }
}
