use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arenacache::{AHashKeyHasher, Cache, Config, Fnv64a, KeyHasher};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const ENTRIES: usize = 100_000;

fn config(shards: usize) -> Config {
    let mut config = Config::new(Duration::from_secs(600));
    config.shards = shards;
    config.clean_window = Duration::ZERO;
    config.max_entries_in_window = ENTRIES;
    config.max_entry_size = 256;
    config.hard_max_cache_size = 256;
    config.verbose = false;
    config
}

fn keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("key-{i:08}")).collect()
}

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    let keys = keys(ENTRIES);

    for size in [16usize, 256, 4096] {
        group.throughput(Throughput::Bytes((size * ENTRIES) as u64));
        let value = vec![0xabu8; size];
        let cache = Cache::new(config(1024)).unwrap();

        group.bench_with_input(BenchmarkId::new("value_bytes", size), &size, |b, _| {
            b.iter(|| {
                for key in &keys {
                    cache.set(black_box(key), black_box(&value)).unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(ENTRIES as u64));
    let keys = keys(ENTRIES);

    for shards in [1usize, 64, 1024] {
        let cache = Cache::new(config(shards)).unwrap();
        for key in &keys {
            cache.set(key, b"some moderately sized value").unwrap();
        }

        group.bench_with_input(BenchmarkId::new("shards", shards), &shards, |b, _| {
            b.iter(|| {
                for key in &keys {
                    black_box(cache.get(black_box(key)).unwrap());
                }
            })
        });
    }

    group.finish();
}

fn bench_append(c: &mut Criterion) {
    let cache = Cache::new(config(64)).unwrap();
    let keys = keys(1024);

    c.bench_function("append_small_chunks", |b| {
        b.iter(|| {
            for key in &keys {
                cache.append(black_box(key), black_box(b"chunk")).unwrap();
            }
            cache.reset();
        })
    });
}

fn bench_parallel_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_mixed");
    let keys = Arc::new(keys(ENTRIES));

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(ENTRIES as u64));
        let cache = Arc::new(Cache::new(config(1024)).unwrap());

        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            b.iter(|| {
                thread::scope(|scope| {
                    for t in 0..threads {
                        let cache = &cache;
                        let keys = &keys;
                        scope.spawn(move || {
                            for (i, key) in keys.iter().enumerate().skip(t).step_by(threads) {
                                if i % 4 == 0 {
                                    cache.set(key, b"value").unwrap();
                                } else {
                                    let _ = black_box(cache.get(key));
                                }
                            }
                        });
                    }
                });
            })
        });
    }

    group.finish();
}

fn bench_hashers(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashers");
    let short = "key-00001234";
    let long = "k".repeat(256);
    let ahash = AHashKeyHasher::default();

    group.bench_function("fnv64a_short", |b| b.iter(|| Fnv64a.sum64(black_box(short))));
    group.bench_function("fnv64a_long", |b| b.iter(|| Fnv64a.sum64(black_box(&long))));
    group.bench_function("ahash_short", |b| b.iter(|| ahash.sum64(black_box(short))));
    group.bench_function("ahash_long", |b| b.iter(|| ahash.sum64(black_box(&long))));

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_append,
    bench_parallel_mixed,
    bench_hashers
);
criterion_main!(benches);
