use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::info;

use crate::arena::ByteQueue;
use crate::clock::Clock;
use crate::config::Config;
use crate::entry::{self, EntryView, HEADERS_SIZE, MAX_KEY_LEN};
use crate::error::{Error, QueueError, Result};
use crate::listener::{RemovalListener, RemoveReason};
use crate::stats::{Metadata, ShardStats, Stats};

/// Freshness of a value returned by `get_with_info`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryStatus {
    Valid,
    /// Older than the life window but not reaped yet.
    Expired,
}

/// Owned copy of one live record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub timestamp: u64,
    pub hash: u64,
    pub key: String,
    pub value: Vec<u8>,
}

struct ShardInner {
    /// key hash -> frame offset in `entries`
    hashmap: HashMap<u64, usize, RandomState>,
    /// key hash -> request count, only filled when stats are enabled
    hashmap_stats: HashMap<u64, u32, RandomState>,
    entries: ByteQueue,
    entry_buffer: Vec<u8>,
}

impl ShardInner {
    fn new(config: &Config) -> Self {
        let initial = config.initial_shard_size();
        let stats_capacity = if config.stats_enabled { initial } else { 0 };
        ShardInner {
            hashmap: HashMap::with_capacity_and_hasher(initial, RandomState::new()),
            hashmap_stats: HashMap::with_capacity_and_hasher(stats_capacity, RandomState::new()),
            entries: ByteQueue::new(
                config.initial_queue_capacity(),
                config.maximum_shard_size_in_bytes(),
                config.verbose,
            ),
            entry_buffer: Vec::with_capacity(config.max_entry_size + HEADERS_SIZE),
        }
    }

    fn metadata(&self, hash: u64) -> Metadata {
        Metadata {
            request_count: self.hashmap_stats.get(&hash).copied().unwrap_or(0),
        }
    }
}

enum Lookup<'a> {
    Found(&'a [u8]),
    Missing,
    Collision,
}

/// One lock domain of the cache: an arena of records plus the index into it.
pub(crate) struct Shard {
    inner: RwLock<ShardInner>,
    stats: ShardStats,
    listener: RemovalListener,
    clock: Arc<dyn Clock>,
    life_window: u64,
    clean_enabled: bool,
    stats_enabled: bool,
    verbose: bool,
}

impl Shard {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Shard {
            inner: RwLock::new(ShardInner::new(config)),
            stats: ShardStats::default(),
            listener: config.removal_listener(),
            clock,
            life_window: config.life_window_secs(),
            clean_enabled: !config.clean_window.is_zero(),
            stats_enabled: config.stats_enabled,
            verbose: config.verbose,
        }
    }

    pub fn get(&self, key: &str, hash: u64) -> Result<Vec<u8>> {
        let value = {
            let inner = self.inner.read();
            let frame = self.find(&inner, key, hash)?;
            entry::decode_value(frame)
        };
        self.hit(hash);
        Ok(value)
    }

    /// Like `get`, but also reports whether the entry outlived the life
    /// window. Expired entries are returned, not evicted.
    pub fn get_with_info(&self, key: &str, hash: u64) -> Result<(Vec<u8>, EntryStatus)> {
        let now = self.now();
        let (value, status) = {
            let inner = self.inner.read();
            let frame = self.find(&inner, key, hash)?;
            let status = if self.is_expired(entry::decode_timestamp(frame), now) {
                EntryStatus::Expired
            } else {
                EntryStatus::Valid
            };
            (entry::decode_value(frame), status)
        };
        self.hit(hash);
        Ok((value, status))
    }

    pub fn set(&self, key: &str, hash: u64, value: &[u8]) -> Result<()> {
        check_key(key)?;
        let now = self.now();

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let mut buffer = std::mem::take(&mut inner.entry_buffer);
        let frame = entry::encode(&mut buffer, now, hash, key, value);
        let result = self.store(inner, hash, now, frame);
        inner.entry_buffer = buffer;
        result
    }

    /// Concatenate `value` onto the stored value of `key`, or create it.
    pub fn append(&self, key: &str, hash: u64, value: &[u8]) -> Result<()> {
        check_key(key)?;
        let now = self.now();

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let mut buffer = std::mem::take(&mut inner.entry_buffer);
        let mut found = false;
        let frame = match self.lookup(inner, key, hash) {
            Ok(Lookup::Found(frame)) => {
                found = true;
                entry::append_value(&mut buffer, now, frame, value)
            }
            Ok(Lookup::Collision) => entry::encode(&mut buffer, now, hash, key, value),
            Ok(Lookup::Missing) => {
                self.stats.miss();
                entry::encode(&mut buffer, now, hash, key, value)
            }
            Err(err) => {
                inner.entry_buffer = buffer;
                drop(guard);
                self.stats.miss();
                return Err(err.into());
            }
        };
        if found {
            self.stats.hit();
            if self.stats_enabled {
                *inner.hashmap_stats.entry(hash).or_insert(0) += 1;
            }
        }
        let result = self.store(inner, hash, now, frame);
        inner.entry_buffer = buffer;
        result
    }

    /// Remove the record indexed under `hash`.
    pub fn delete(&self, hash: u64) -> Result<()> {
        {
            let inner = self.inner.read();
            let checked = match inner.hashmap.get(&hash) {
                Some(&index) => inner.entries.check_get(index).map_err(Error::from),
                None => Err(Error::EntryNotFound),
            };
            if let Err(err) = checked {
                drop(inner);
                self.stats.del_miss();
                return Err(err);
            }
        }

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        // Re-check: a writer may have run between the two locks.
        let Some(&index) = inner.hashmap.get(&hash) else {
            drop(guard);
            self.stats.del_miss();
            return Err(Error::EntryNotFound);
        };
        let frame = match inner.entries.get(index) {
            Ok(frame) => frame,
            Err(err) => {
                drop(guard);
                self.stats.del_miss();
                return Err(err.into());
            }
        };

        inner.hashmap.remove(&hash);
        if let Some(view) = EntryView::parse(frame) {
            self.listener
                .notify(view, RemoveReason::Deleted, || inner.metadata(hash));
        }
        if self.stats_enabled {
            inner.hashmap_stats.remove(&hash);
        }
        if let Ok(frame) = inner.entries.get_mut(index) {
            if entry::is_record(frame) {
                entry::zero_hash(frame);
            }
        }
        drop(guard);

        self.stats.del_hit();
        Ok(())
    }

    /// Pop expired records off the front of the arena. Returns how many
    /// frames were released.
    pub fn clean_up(&self, now: u64) -> usize {
        let mut guard = self.inner.write();
        let mut released = 0;
        while self.evict_if_expired(&mut guard, now) {
            released += 1;
        }
        released
    }

    /// Drop every entry and rebuild the arena at its initial size.
    pub fn reset(&self, config: &Config) {
        *self.inner.write() = ShardInner::new(config);
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub fn len(&self) -> usize {
        self.inner.read().hashmap.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().entries.capacity()
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    pub fn key_metadata(&self, hash: u64) -> Metadata {
        self.inner.read().metadata(hash)
    }

    /// Snapshot of every indexed hash, for iteration without holding the lock.
    pub fn copy_hash_keys(&self) -> Vec<u64> {
        self.inner.read().hashmap.keys().copied().collect()
    }

    /// Copy of the live, unexpired record under `hash`.
    pub fn entry_info(&self, hash: u64) -> Option<EntryInfo> {
        let now = self.now();
        let inner = self.inner.read();
        let &index = inner.hashmap.get(&hash)?;
        let view = EntryView::parse(inner.entries.get(index).ok()?)?;
        if view.is_tombstoned() || self.is_expired(view.timestamp(), now) {
            return None;
        }
        Some(EntryInfo {
            timestamp: view.timestamp(),
            hash: view.hash(),
            key: view.key().into_owned(),
            value: view.value().to_vec(),
        })
    }

    fn now(&self) -> u64 {
        self.clock.epoch().max(0) as u64
    }

    fn is_expired(&self, timestamp: u64, now: u64) -> bool {
        self.life_window > 0 && now > timestamp && now - timestamp > self.life_window
    }

    fn hit(&self, hash: u64) {
        self.stats.hit();
        if self.stats_enabled {
            *self.inner.write().hashmap_stats.entry(hash).or_insert(0) += 1;
        }
    }

    fn find<'a>(&self, inner: &'a ShardInner, key: &str, hash: u64) -> Result<&'a [u8]> {
        match self.lookup(inner, key, hash) {
            Ok(Lookup::Found(frame)) => Ok(frame),
            Ok(Lookup::Collision) => Err(Error::EntryNotFound),
            Ok(Lookup::Missing) => {
                self.stats.miss();
                Err(Error::EntryNotFound)
            }
            Err(err) => {
                self.stats.miss();
                Err(err.into())
            }
        }
    }

    /// Resolve `hash` to a record and confirm it stores `key`.
    fn lookup<'a>(
        &self,
        inner: &'a ShardInner,
        key: &str,
        hash: u64,
    ) -> std::result::Result<Lookup<'a>, QueueError> {
        let Some(&index) = inner.hashmap.get(&hash) else {
            return Ok(Lookup::Missing);
        };
        let frame = inner.entries.get(index)?;
        if !entry::is_record(frame) {
            return Ok(Lookup::Missing);
        }
        if !entry::key_matches(frame, key) {
            self.stats.collision();
            if self.verbose {
                info!(
                    key,
                    stored_key = %entry::decode_key(frame),
                    hash,
                    "collision detected"
                );
            }
            return Ok(Lookup::Collision);
        }
        Ok(Lookup::Found(frame))
    }

    /// Index `frame` under `hash`, superseding any previous record and
    /// evicting the oldest records until the arena takes it.
    fn store(&self, inner: &mut ShardInner, hash: u64, now: u64, frame: &[u8]) -> Result<()> {
        if let Some(&previous) = inner.hashmap.get(&hash) {
            if let Ok(old) = inner.entries.get_mut(previous) {
                if entry::is_record(old) {
                    entry::zero_hash(old);
                }
                inner.hashmap.remove(&hash);
            }
        }

        if !self.clean_enabled {
            self.evict_if_expired(inner, now);
        }

        loop {
            match inner.entries.push(frame) {
                Ok(index) => {
                    inner.hashmap.insert(hash, index);
                    return Ok(());
                }
                Err(_) => {
                    if !self.remove_oldest(inner, RemoveReason::NoSpace) {
                        return Err(Error::EntryTooLarge);
                    }
                }
            }
        }
    }

    /// Pop the oldest frame if it expired. Filler always counts as expired.
    fn evict_if_expired(&self, inner: &mut ShardInner, now: u64) -> bool {
        let expired = match inner.entries.peek() {
            Ok(frame) => match EntryView::parse(frame) {
                Some(view) => self.is_expired(view.timestamp(), now),
                None => true,
            },
            Err(_) => false,
        };
        expired && self.remove_oldest(inner, RemoveReason::Expired)
    }

    /// Pop the oldest frame, unindexing and reporting it unless it was
    /// already superseded. Returns false when the arena is empty.
    fn remove_oldest(&self, inner: &mut ShardInner, reason: RemoveReason) -> bool {
        let Ok(oldest) = inner.entries.pop() else {
            return false;
        };
        let Some(view) = EntryView::parse(oldest) else {
            return true;
        };
        if view.is_tombstoned() {
            return true;
        }

        let hash = view.hash();
        inner.hashmap.remove(&hash);
        let hashmap_stats = &inner.hashmap_stats;
        self.listener.notify(view, reason, || Metadata {
            request_count: hashmap_stats.get(&hash).copied().unwrap_or(0),
        });
        if self.stats_enabled {
            inner.hashmap_stats.remove(&hash);
        }
        true
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(Error::KeyTooLong {
            len: key.len(),
            max: MAX_KEY_LEN,
        });
    }
    Ok(())
}
