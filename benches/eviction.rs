//! Benchmark eviction passes and timestamp lookups over a 10k-record namespace.

use std::path::PathBuf;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ms_core::LibraryId;
use ms_db::{EvictionEngine, EvictionMode, Namespace, RecordStore, TimestampEntry, TimestampStore};

const LIB: LibraryId = LibraryId::new(1);
const RECORDS: usize = 10_000;

fn setup() -> (RecordStore, TimestampStore) {
    let store = RecordStore::open_in_memory(&[]).expect("store");
    let timestamps = TimestampStore::new(store.clone());
    let entries: Vec<TimestampEntry> = (0..RECORDS)
        .map(|i| TimestampEntry {
            library_id: LIB,
            path: PathBuf::from(format!("/media/movies/{:03}/file{i:05}.mkv", i % 500)),
            mtime: 1_700_000_000 + i as i64,
        })
        .collect();
    timestamps.record_seen_bulk(&entries).expect("seed");
    (store, timestamps)
}

fn bench_eviction(c: &mut Criterion) {
    let (store, timestamps) = setup();
    let engine = EvictionEngine::new(store.clone());
    let ns = Namespace::timestamps(LIB);

    let mut group = c.benchmark_group("eviction");

    group.bench_function("evict_pass_5pct_keep_all", |b| {
        b.iter(|| {
            engine
                .run(&ns, 0.05, EvictionMode::Evict, |_| true)
                .unwrap();
        });
    });

    group.bench_function("reset_pass_1pct_fresh_store", |b| {
        b.iter_batched(
            || {
                let (store, _) = setup();
                EvictionEngine::new(store)
            },
            |engine| {
                engine
                    .run(&ns, 0.01, EvictionMode::Reset, |_| true)
                    .unwrap();
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("is_unchanged_at", |b| {
        let path = PathBuf::from("/media/movies/042/file05042.mkv");
        b.iter(|| {
            timestamps
                .is_unchanged_at(LIB, &path, 1_700_005_042)
                .unwrap();
        });
    });

    group.bench_function("all_as_map_snapshot", |b| {
        b.iter(|| {
            timestamps.all_as_map(LIB).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_eviction);
criterion_main!(benches);
