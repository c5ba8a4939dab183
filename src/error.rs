use std::io;

use thiserror::Error;

/// Result type used across the cache.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the cache and its shards.
#[derive(Debug, Error)]
pub enum Error {
    #[error("entry not found")]
    EntryNotFound,

    #[error("entry is bigger than max shard size")]
    EntryTooLarge,

    #[error("key is {len} bytes long, keys are limited to {max} bytes")]
    KeyTooLong { len: usize, max: usize },

    #[error("shards number must be power of two, got {0}")]
    ShardsNotPowerOfTwo(usize),

    #[error("life window must be > 0 when clean window is set")]
    CleanWindowWithoutLifeWindow,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("failed to spawn cleanup worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Errors reported by [`ByteQueue`](crate::arena::ByteQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,

    #[error("index must be greater than zero, invalid index")]
    InvalidIndex,

    #[error("index out of bounds")]
    IndexOutOfBounds,

    #[error("queue is full, maximum size limit reached")]
    Full,
}
