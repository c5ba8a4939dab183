use crate::shard::{EntryInfo, Shard};

/// Walks every live entry of a cache, one shard at a time.
///
/// Each shard's hashes are snapshotted when the iterator reaches it, and
/// every entry is copied out under a short read lock. Entries written after
/// the snapshot are not seen; entries removed after it are skipped, as are
/// entries already past their life window.
pub struct EntryInfoIterator<'a> {
    shards: &'a [Shard],
    current_shard: usize,
    hashes: Vec<u64>,
    position: usize,
}

impl<'a> EntryInfoIterator<'a> {
    pub(crate) fn new(shards: &'a [Shard]) -> Self {
        EntryInfoIterator {
            shards,
            current_shard: 0,
            hashes: Vec::new(),
            position: 0,
        }
    }
}

impl Iterator for EntryInfoIterator<'_> {
    type Item = EntryInfo;

    fn next(&mut self) -> Option<EntryInfo> {
        loop {
            while self.position < self.hashes.len() {
                let hash = self.hashes[self.position];
                self.position += 1;
                if let Some(info) = self.shards[self.current_shard - 1].entry_info(hash) {
                    return Some(info);
                }
            }

            let shard = self.shards.get(self.current_shard)?;
            self.hashes = shard.copy_hash_keys();
            self.position = 0;
            self.current_shard += 1;
        }
    }
}
