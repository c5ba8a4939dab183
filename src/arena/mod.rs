/// Byte arena backing each shard.
///
/// `ByteQueue` is a FIFO ring buffer over one contiguous `Vec<u8>`. Every
/// push writes a length-prefixed frame and returns the frame's offset, which
/// can later be used for random access. Frames are never freed individually:
/// space comes back only when the oldest frame is popped.
///
/// Layout of the arena:
///   [0: unused][frame][frame]...[free]...[frame]
///
/// Offset 0 is never handed out, so callers can use it as "absent".
/// The queue has no internal locking; the owning shard serializes access.
use std::time::Instant;

use tracing::info;

use crate::error::QueueError;
use varint::{needed_size, put_uvarint, uvarint, MAX_HEADER_LEN};

/// LEB128 unsigned varints used as frame headers. A header stores the total
/// frame size, header included, so a reader can hop from frame to frame.
pub mod varint;

/// Smallest frame a shard ever writes: 1 byte header + timestamp + hash.
///
/// A gap in front of `head` must either be filled exactly or leave at least
/// this much room, otherwise a later frame could make `head == tail` with the
/// queue in an ambiguous empty/full state.
const MINIMUM_HEADER_SIZE: usize = 17;

/// First usable offset. Bytes before it are never written.
pub const LEFT_MARGIN: usize = 1;

pub struct ByteQueue {
    array: Vec<u8>,
    capacity: usize,
    max_capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
    right_margin: usize,
    full: bool,
    verbose: bool,
}

impl ByteQueue {
    /// Create a queue with `capacity` bytes preallocated.
    ///
    /// `max_capacity` caps growth; 0 means the queue may grow without bound.
    pub fn new(capacity: usize, max_capacity: usize, verbose: bool) -> Self {
        let capacity = capacity.max(LEFT_MARGIN);
        ByteQueue {
            array: vec![0; capacity],
            capacity,
            max_capacity,
            head: LEFT_MARGIN,
            tail: LEFT_MARGIN,
            count: 0,
            right_margin: LEFT_MARGIN,
            full: false,
            verbose,
        }
    }

    /// Drop every frame. The arena itself is kept.
    pub fn reset(&mut self) {
        self.head = LEFT_MARGIN;
        self.tail = LEFT_MARGIN;
        self.right_margin = LEFT_MARGIN;
        self.count = 0;
        self.full = false;
    }

    /// Append `data` as a new frame and return its offset.
    ///
    /// Tries the space after `tail` first, then the space before `head`
    /// (wrapping around), and finally grows the arena.
    pub fn push(&mut self, data: &[u8]) -> Result<usize, QueueError> {
        let needed = needed_size(data.len());

        if !self.can_insert_after_tail(needed) {
            if self.can_insert_before_head(needed) {
                self.tail = LEFT_MARGIN;
            } else {
                let capacity = self.grown_capacity(needed);
                // Growth re-linearizes the arena, so the frame lands at `right_margin`.
                if capacity.saturating_sub(self.right_margin) < needed {
                    return Err(QueueError::Full);
                }
                self.allocate_additional_memory(capacity);
            }
        }

        let index = self.tail;
        self.write_frame(data, needed);
        Ok(index)
    }

    /// Remove the oldest frame and return its payload.
    pub fn pop(&mut self) -> Result<&[u8], QueueError> {
        let (start, end, block_size) = self.locate(self.head)?;

        self.head += block_size;
        self.count -= 1;

        if self.head == self.right_margin {
            self.head = LEFT_MARGIN;
            if self.tail == self.right_margin {
                self.tail = LEFT_MARGIN;
            }
            self.right_margin = self.tail;
        }

        self.full = false;

        Ok(&self.array[start..end])
    }

    /// Read the oldest frame without removing it.
    pub fn peek(&self) -> Result<&[u8], QueueError> {
        self.get(self.head)
    }

    /// Read the frame starting at `index`.
    pub fn get(&self, index: usize) -> Result<&[u8], QueueError> {
        let (start, end, _) = self.locate(index)?;
        Ok(&self.array[start..end])
    }

    /// Mutable access to the frame starting at `index`.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut [u8], QueueError> {
        let (start, end, _) = self.locate(index)?;
        Ok(&mut self.array[start..end])
    }

    /// Check that a frame could be read from `index` without reading it.
    pub fn check_get(&self, index: usize) -> Result<(), QueueError> {
        if self.count == 0 {
            return Err(QueueError::Empty);
        }
        if index == 0 {
            return Err(QueueError::InvalidIndex);
        }
        if index >= self.array.len() {
            return Err(QueueError::IndexOutOfBounds);
        }
        Ok(())
    }

    /// Number of bytes allocated for the arena.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames in the queue, filler frames included.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Resolve `index` to the payload range `[start, end)` and the full
    /// frame size (header included).
    fn locate(&self, index: usize) -> Result<(usize, usize, usize), QueueError> {
        self.check_get(index)?;

        let (block_size, header_len) =
            uvarint(&self.array[index..]).ok_or(QueueError::InvalidIndex)?;
        let block_size = block_size as usize;
        if block_size < header_len {
            return Err(QueueError::InvalidIndex);
        }
        let end = index + block_size;
        if end > self.array.len() {
            return Err(QueueError::IndexOutOfBounds);
        }
        Ok((index + header_len, end, block_size))
    }

    /// Arena size for a push of `minimum` bytes: doubled, or enlarged by
    /// `minimum` if that is more, clamped to `max_capacity`.
    fn grown_capacity(&self, minimum: usize) -> usize {
        let capacity = (self.capacity * 2).max(self.capacity + minimum);
        match self.max_capacity {
            0 => capacity,
            max => capacity.min(max),
        }
    }

    /// Reallocate the arena at `capacity` bytes.
    ///
    /// A wrapped queue is re-linearized: the gap between `tail` and `head`
    /// is sealed with a zeroed filler frame so the frames keep their offsets.
    fn allocate_additional_memory(&mut self, capacity: usize) {
        let start = Instant::now();

        self.capacity = capacity;

        let old = std::mem::replace(&mut self.array, vec![0; capacity]);

        if self.right_margin != LEFT_MARGIN {
            self.array[..self.right_margin].copy_from_slice(&old[..self.right_margin]);

            if self.tail <= self.head {
                if self.tail != self.head {
                    let gap = self.head - self.tail;
                    self.write_filler(gap);
                }
                self.head = LEFT_MARGIN;
                self.tail = self.right_margin;
            }
        }

        self.full = false;

        if self.verbose {
            info!(
                capacity = self.capacity,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "expanded byte queue"
            );
        }
    }

    /// Write a frame of `len` total bytes carrying `data` at `tail`.
    fn write_frame(&mut self, data: &[u8], len: usize) {
        let mut header = [0u8; MAX_HEADER_LEN];
        let header_len = put_uvarint(&mut header, len as u64);
        let body_len = len - header_len;

        let at = self.tail;
        self.array[at..at + header_len].copy_from_slice(&header[..header_len]);
        self.array[at + header_len..at + len].copy_from_slice(&data[..body_len]);
        self.tail += len;

        self.after_write();
    }

    /// Seal `len` bytes at `tail` with a zero-filled frame.
    fn write_filler(&mut self, len: usize) {
        let mut header = [0u8; MAX_HEADER_LEN];
        let header_len = put_uvarint(&mut header, len as u64);

        let at = self.tail;
        self.array[at..at + header_len].copy_from_slice(&header[..header_len]);
        self.array[at + header_len..at + len].fill(0);
        self.tail += len;

        self.after_write();
    }

    #[inline]
    fn after_write(&mut self) {
        if self.tail > self.head {
            self.right_margin = self.tail;
        }
        if self.tail == self.head {
            self.full = true;
        }
        self.count += 1;
    }

    fn can_insert_after_tail(&self, need: usize) -> bool {
        if self.full {
            return false;
        }
        if self.tail >= self.head {
            return self.capacity.saturating_sub(self.tail) >= need;
        }
        // Leave room for at least one more minimal frame, or fill exactly.
        let free = self.head - self.tail;
        free == need || free >= need + MINIMUM_HEADER_SIZE
    }

    fn can_insert_before_head(&self, need: usize) -> bool {
        if self.full {
            return false;
        }
        let free = if self.tail >= self.head {
            self.head - LEFT_MARGIN
        } else {
            self.head - self.tail
        };
        free == need || free >= need + MINIMUM_HEADER_SIZE
    }
}
