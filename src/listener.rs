use std::fmt;
use std::sync::Arc;

use crate::entry::EntryView;
use crate::stats::Metadata;

/// Why an entry left the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RemoveReason {
    /// Older than the life window.
    Expired = 1,
    /// Evicted to make room for a newer entry.
    NoSpace = 2,
    /// Removed by an explicit delete.
    Deleted = 3,
}

impl RemoveReason {
    #[inline]
    pub(crate) fn mask(self) -> u32 {
        1 << self as u32
    }
}

pub type OnRemove = dyn Fn(&str, &[u8]) + Send + Sync;
pub type OnRemoveWithReason = dyn Fn(&str, &[u8], RemoveReason) + Send + Sync;
pub type OnRemoveWithMetadata = dyn Fn(&str, &[u8], Metadata) + Send + Sync;

/// The one removal callback a cache was configured with.
///
/// Callbacks run while the owning shard's write lock is held and must not
/// call back into the same cache.
#[derive(Clone, Default)]
pub(crate) enum RemovalListener {
    #[default]
    None,
    Basic(Arc<OnRemove>),
    /// `filter` is a bitmask of `1 << reason`; 0 lets every reason through.
    WithReason {
        callback: Arc<OnRemoveWithReason>,
        filter: u32,
    },
    WithMetadata(Arc<OnRemoveWithMetadata>),
}

impl RemovalListener {
    /// Report a removed record. `metadata` is only evaluated when the
    /// listener asked for it.
    pub fn notify(
        &self,
        entry: EntryView<'_>,
        reason: RemoveReason,
        metadata: impl FnOnce() -> Metadata,
    ) {
        match self {
            RemovalListener::None => {}
            RemovalListener::Basic(callback) => callback(&*entry.key(), entry.value()),
            RemovalListener::WithReason { callback, filter } => {
                if *filter == 0 || reason.mask() & *filter != 0 {
                    callback(&*entry.key(), entry.value(), reason);
                }
            }
            RemovalListener::WithMetadata(callback) => {
                callback(&*entry.key(), entry.value(), metadata())
            }
        }
    }
}

impl fmt::Debug for RemovalListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalListener::None => f.write_str("None"),
            RemovalListener::Basic(_) => f.write_str("Basic"),
            RemovalListener::WithReason { filter, .. } => {
                f.debug_struct("WithReason").field("filter", filter).finish()
            }
            RemovalListener::WithMetadata(_) => f.write_str("WithMetadata"),
        }
    }
}
