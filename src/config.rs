use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::key::{Fnv64a, KeyHasher};
use crate::listener::{RemovalListener, RemoveReason};
use crate::stats::Metadata;

/// Lower bound on the number of entries a shard is sized for.
const MINIMUM_ENTRIES_IN_SHARD: usize = 10;

const MB: usize = 1024 * 1024;

/// Cache configuration, validated once when the cache is built.
#[derive(Clone)]
pub struct Config {
    /// Number of shards. Must be a power of two.
    pub shards: usize,
    /// Age after which an entry counts as expired. Zero disables expiry.
    pub life_window: Duration,
    /// Interval of the background cleanup. Zero disables the worker and
    /// shards expire their oldest entry on each write instead.
    pub clean_window: Duration,
    /// Expected number of entries alive within one life window. Sizing hint.
    pub max_entries_in_window: usize,
    /// Expected entry size in bytes. Sizing hint.
    pub max_entry_size: usize,
    /// Upper bound on arena memory in megabytes, split evenly over shards.
    /// Zero means unbounded.
    pub hard_max_cache_size: usize,
    /// Log collisions and arena growth.
    pub verbose: bool,
    /// Track per-key request counts.
    pub stats_enabled: bool,
    /// Key hash used for shard routing and indexing.
    pub hasher: Arc<dyn KeyHasher>,
    listener: RemovalListener,
    remove_filter: u32,
}

impl Config {
    /// Configuration sized for a busy cache whose entries live `life_window`.
    pub fn new(life_window: Duration) -> Self {
        Config {
            shards: 1024,
            life_window,
            clean_window: Duration::from_secs(1),
            max_entries_in_window: 1000 * 10 * 60,
            max_entry_size: 500,
            hard_max_cache_size: 0,
            verbose: true,
            stats_enabled: false,
            hasher: Arc::new(Fnv64a),
            listener: RemovalListener::None,
            remove_filter: 0,
        }
    }

    /// Call `callback` with the key and value of every removed entry.
    pub fn on_remove<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.listener = RemovalListener::Basic(Arc::new(callback));
        self
    }

    /// Like [`on_remove`](Self::on_remove), also passing the reason.
    /// Honors [`on_remove_filter`](Self::on_remove_filter).
    pub fn on_remove_with_reason<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &[u8], RemoveReason) + Send + Sync + 'static,
    {
        self.listener = RemovalListener::WithReason {
            callback: Arc::new(callback),
            filter: 0,
        };
        self
    }

    /// Like [`on_remove`](Self::on_remove), also passing the key's
    /// metadata. Metadata is only populated with `stats_enabled`.
    pub fn on_remove_with_metadata<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &[u8], Metadata) + Send + Sync + 'static,
    {
        self.listener = RemovalListener::WithMetadata(Arc::new(callback));
        self
    }

    /// Restrict the reason-aware callback to `reasons`.
    pub fn on_remove_filter(mut self, reasons: &[RemoveReason]) -> Self {
        self.remove_filter = reasons.iter().fold(0, |mask, r| mask | r.mask());
        self
    }

    pub fn with_hasher<H>(mut self, hasher: H) -> Self
    where
        H: KeyHasher + 'static,
    {
        self.hasher = Arc::new(hasher);
        self
    }

    /// Reject configurations the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.shards.is_power_of_two() {
            return Err(Error::ShardsNotPowerOfTwo(self.shards));
        }
        if !self.clean_window.is_zero() && self.life_window_secs() == 0 {
            return Err(Error::CleanWindowWithoutLifeWindow);
        }
        Ok(())
    }

    /// Number of entries each shard's index is presized for.
    pub fn initial_shard_size(&self) -> usize {
        (self.max_entries_in_window / self.shards.max(1)).max(MINIMUM_ENTRIES_IN_SHARD)
    }

    /// Arena size limit per shard in bytes, 0 when unbounded.
    pub fn maximum_shard_size_in_bytes(&self) -> usize {
        self.hard_max_cache_size.saturating_mul(MB) / self.shards.max(1)
    }

    /// Bytes preallocated for each shard's arena.
    pub(crate) fn initial_queue_capacity(&self) -> usize {
        let capacity = self.initial_shard_size().saturating_mul(self.max_entry_size);
        match self.maximum_shard_size_in_bytes() {
            0 => capacity,
            max => capacity.min(max),
        }
    }

    pub(crate) fn life_window_secs(&self) -> u64 {
        self.life_window.as_secs()
    }

    /// The configured listener with the reason filter attached.
    pub(crate) fn removal_listener(&self) -> RemovalListener {
        match &self.listener {
            RemovalListener::WithReason { callback, .. } => RemovalListener::WithReason {
                callback: callback.clone(),
                filter: self.remove_filter,
            },
            other => other.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            clean_window: Duration::ZERO,
            ..Config::new(Duration::ZERO)
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("shards", &self.shards)
            .field("life_window", &self.life_window)
            .field("clean_window", &self.clean_window)
            .field("max_entries_in_window", &self.max_entries_in_window)
            .field("max_entry_size", &self.max_entry_size)
            .field("hard_max_cache_size", &self.hard_max_cache_size)
            .field("verbose", &self.verbose)
            .field("stats_enabled", &self.stats_enabled)
            .field("listener", &self.listener)
            .field("remove_filter", &self.remove_filter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::new(Duration::from_secs(600)).validate().unwrap();
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_shard_counts_that_are_not_powers_of_two() {
        for shards in [0, 3, 6, 1000] {
            let config = Config { shards, ..Config::default() };
            assert!(matches!(config.validate(), Err(Error::ShardsNotPowerOfTwo(n)) if n == shards));
        }
        for shards in [1, 2, 64, 1024] {
            let config = Config { shards, ..Config::default() };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn clean_window_needs_a_life_window() {
        let config = Config {
            clean_window: Duration::from_secs(1),
            life_window: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::CleanWindowWithoutLifeWindow)));

        // Sub-second life windows round down to zero.
        let config = Config {
            clean_window: Duration::from_secs(1),
            life_window: Duration::from_millis(500),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::CleanWindowWithoutLifeWindow)));
    }

    #[test]
    fn shard_sizing() {
        let config = Config {
            shards: 4,
            max_entries_in_window: 400,
            max_entry_size: 16,
            hard_max_cache_size: 0,
            ..Config::default()
        };
        assert_eq!(config.initial_shard_size(), 100);
        assert_eq!(config.maximum_shard_size_in_bytes(), 0);
        assert_eq!(config.initial_queue_capacity(), 1600);

        let small = Config {
            shards: 4,
            max_entries_in_window: 8,
            ..config.clone()
        };
        assert_eq!(small.initial_shard_size(), MINIMUM_ENTRIES_IN_SHARD);
    }

    #[test]
    fn hard_limit_caps_initial_capacity() {
        let config = Config {
            shards: 2,
            max_entries_in_window: 1_000_000,
            max_entry_size: 1024,
            hard_max_cache_size: 1,
            ..Config::default()
        };
        assert_eq!(config.maximum_shard_size_in_bytes(), MB / 2);
        assert_eq!(config.initial_queue_capacity(), MB / 2);
    }

    #[test]
    fn filter_is_attached_to_reason_listener() {
        let config = Config::default()
            .on_remove_with_reason(|_, _, _| {})
            .on_remove_filter(&[RemoveReason::Expired, RemoveReason::NoSpace]);

        match config.removal_listener() {
            RemovalListener::WithReason { filter, .. } => assert_eq!(filter, 0b0110),
            other => panic!("unexpected listener {other:?}"),
        }
    }

    #[test]
    fn last_listener_wins() {
        let config = Config::default()
            .on_remove_with_metadata(|_, _, _| {})
            .on_remove(|_, _| {});

        assert!(matches!(config.removal_listener(), RemovalListener::Basic(_)));
        assert!(matches!(Config::default().removal_listener(), RemovalListener::None));
    }
}
