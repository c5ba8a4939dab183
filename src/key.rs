use std::hash::BuildHasher;

use ahash::RandomState;

/// Maps a key to the 64-bit hash used for shard routing and indexing.
///
/// Implementations must be deterministic for the lifetime of a cache.
/// Collisions are tolerated: shards compare the stored key before
/// returning a value.
pub trait KeyHasher: Send + Sync {
    fn sum64(&self, key: &str) -> u64;
}

impl<F> KeyHasher for F
where
    F: Fn(&str) -> u64 + Send + Sync,
{
    #[inline(always)]
    fn sum64(&self, key: &str) -> u64 {
        self(key)
    }
}

const FNV_OFFSET64: u64 = 14_695_981_039_346_656_037;
const FNV_PRIME64: u64 = 1_099_511_628_211;

/// FNV-1a 64-bit. Allocation free and stable across builds; the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fnv64a;

impl KeyHasher for Fnv64a {
    #[inline]
    fn sum64(&self, key: &str) -> u64 {
        key.as_bytes().iter().fold(FNV_OFFSET64, |hash, &byte| {
            (hash ^ byte as u64).wrapping_mul(FNV_PRIME64)
        })
    }
}

/// aHash with fixed seeds, so every shard and every call agree on a key.
///
/// Faster than FNV on long keys, but the output is only stable within one
/// build of the crate.
#[derive(Clone, Debug)]
pub struct AHashKeyHasher {
    state: RandomState,
}

impl AHashKeyHasher {
    pub fn with_seeds(k0: u64, k1: u64, k2: u64, k3: u64) -> Self {
        AHashKeyHasher {
            state: RandomState::with_seeds(k0, k1, k2, k3),
        }
    }
}

impl Default for AHashKeyHasher {
    fn default() -> Self {
        Self::with_seeds(
            0x243f_6a88_85a3_08d3,
            0x1319_8a2e_0370_7344,
            0xa409_3822_299f_31d0,
            0x082e_fa98_ec4e_6c89,
        )
    }
}

impl KeyHasher for AHashKeyHasher {
    #[inline]
    fn sum64(&self, key: &str) -> u64 {
        self.state.hash_one(key)
    }
}
