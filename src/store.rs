use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{bounded, never, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::cleaner;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::iter::EntryInfoIterator;
use crate::key::KeyHasher;
use crate::shard::{EntryStatus, Shard};
use crate::stats::{Metadata, Stats};

/// Stand-in for keys that hash to 0. Routes to the last shard.
const ZERO_HASH_REPLACEMENT: u64 = u64::MAX;

/// Sharded byte cache.
///
/// Every key is hashed once and routed to `shards[hash & mask]`; each shard
/// has its own lock, so unrelated keys rarely contend. Values are stored as
/// bytes inside per-shard arenas and copied out on read.
pub struct Cache {
    shards: Arc<[Shard]>,
    shard_mask: u64,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn KeyHasher>,
    config: Config,
    close: Mutex<Option<Sender<()>>>,
}

impl Cache {
    /// Build a cache on the system clock.
    pub fn new(config: Config) -> Result<Self> {
        Self::build(config, Arc::new(SystemClock), never())
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::build(config, clock, never())
    }

    /// Like [`with_clock`](Self::with_clock); the cleanup worker also stops
    /// when `cancel` receives a message or disconnects.
    pub fn with_cancellation(
        config: Config,
        clock: Arc<dyn Clock>,
        cancel: Receiver<()>,
    ) -> Result<Self> {
        Self::build(config, clock, cancel)
    }

    fn build(config: Config, clock: Arc<dyn Clock>, cancel: Receiver<()>) -> Result<Self> {
        config.validate()?;

        let shards: Arc<[Shard]> = (0..config.shards)
            .map(|_| Shard::new(&config, clock.clone()))
            .collect();

        let close = if config.clean_window.is_zero() {
            None
        } else {
            let (close_tx, close_rx) = bounded(0);
            cleaner::spawn(
                shards.clone(),
                clock.clone(),
                config.clean_window,
                close_rx,
                cancel,
            )?;
            Some(close_tx)
        };

        debug!(
            shards = config.shards,
            life_window_secs = config.life_window.as_secs(),
            clean_window_ms = config.clean_window.as_millis() as u64,
            "cache created"
        );

        Ok(Cache {
            shard_mask: (config.shards - 1) as u64,
            hasher: config.hasher.clone(),
            shards,
            clock,
            config,
            close: Mutex::new(close),
        })
    }

    /// Hash of `key` as stored in the shard index. Zero marks superseded
    /// records inside the arena, so it is never handed to a shard.
    #[inline(always)]
    fn hash_key(&self, key: &str) -> u64 {
        match self.hasher.sum64(key) {
            0 => ZERO_HASH_REPLACEMENT,
            hash => hash,
        }
    }

    #[inline(always)]
    fn shard(&self, hash: u64) -> &Shard {
        &self.shards[(hash & self.shard_mask) as usize]
    }

    /// Copy of the value stored for `key`.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        let hash = self.hash_key(key);
        self.shard(hash).get(key, hash)
    }

    /// Like [`get`](Self::get), also reporting whether the entry is past its
    /// life window and only waiting to be reaped.
    pub fn get_with_info(&self, key: &str) -> Result<(Vec<u8>, EntryStatus)> {
        let hash = self.hash_key(key);
        self.shard(hash).get_with_info(key, hash)
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let hash = self.hash_key(key);
        self.shard(hash).set(key, hash, value)
    }

    /// Append `value` to the value stored under `key`, creating it if absent.
    pub fn append(&self, key: &str, value: &[u8]) -> Result<()> {
        let hash = self.hash_key(key);
        self.shard(hash).append(key, hash, value)
    }

    /// Remove whatever is indexed under the hash of `key`.
    pub fn delete(&self, key: &str) -> Result<()> {
        let hash = self.hash_key(key);
        self.shard(hash).delete(hash)
    }

    /// Drop every entry and shrink each arena back to its initial size.
    pub fn reset(&self) {
        for shard in self.shards.iter() {
            shard.reset(&self.config);
        }
    }

    pub fn reset_stats(&self) {
        for shard in self.shards.iter() {
            shard.reset_stats();
        }
    }

    /// Number of indexed entries. Expired entries count until reaped.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes allocated across all shard arenas.
    pub fn capacity(&self) -> usize {
        self.shards.iter().map(Shard::capacity).sum()
    }

    pub fn stats(&self) -> Stats {
        let mut total = Stats::default();
        for shard in self.shards.iter() {
            total += shard.stats();
        }
        total
    }

    /// Request counters for `key`; zero unless `stats_enabled`.
    pub fn key_metadata(&self, key: &str) -> Metadata {
        let hash = self.hash_key(key);
        self.shard(hash).key_metadata(hash)
    }

    /// Iterate over copies of every live entry, shard by shard.
    pub fn iter(&self) -> EntryInfoIterator<'_> {
        EntryInfoIterator::new(&self.shards)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the cleanup worker. Does not wait for it to exit.
    pub fn close(&self) {
        if self.close.lock().take().is_some() {
            debug!("cache closed");
        }
    }

    /// Reap expired entries now, as the background worker does on each
    /// tick. Returns the number of arena frames released.
    pub fn clean_up(&self) -> usize {
        let now = self.clock.epoch().max(0) as u64;
        cleaner::clean_all(&self.shards, now)
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.close();
    }
}

impl<'a> IntoIterator for &'a Cache {
    type Item = crate::shard::EntryInfo;
    type IntoIter = EntryInfoIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("shards", &self.shards.len())
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("config", &self.config)
            .finish()
    }
}
