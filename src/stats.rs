use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache counters, summed over shards by `Cache::stats`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups of keys that were not present.
    pub misses: u64,
    /// Successful deletes.
    pub del_hits: u64,
    /// Deletes of keys that were not present.
    pub del_misses: u64,
    /// Lookups that found a record for the hash but a different key.
    pub collisions: u64,
}

/// Per-key bookkeeping, tracked only when `stats_enabled` is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    pub request_count: u32,
}

/// Lock-free shard counters.
#[derive(Debug, Default)]
pub(crate) struct ShardStats {
    hits: AtomicU64,
    misses: AtomicU64,
    del_hits: AtomicU64,
    del_misses: AtomicU64,
    collisions: AtomicU64,
}

impl ShardStats {
    #[inline]
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn del_hit(&self) {
        self.del_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn del_miss(&self) {
        self.del_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            del_hits: self.del_hits.load(Ordering::Relaxed),
            del_misses: self.del_misses.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.del_hits.store(0, Ordering::Relaxed);
        self.del_misses.store(0, Ordering::Relaxed);
        self.collisions.store(0, Ordering::Relaxed);
    }
}

impl std::ops::AddAssign for Stats {
    fn add_assign(&mut self, other: Stats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.del_hits += other.del_hits;
        self.del_misses += other.del_misses;
        self.collisions += other.collisions;
    }
}
