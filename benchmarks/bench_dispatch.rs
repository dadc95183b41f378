use std::hint::black_box;
use std::io::Cursor;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use memcload::config::ShardMap;
use memcload::pool::{dispatch, PoolConfig};
use memcload::store::{Connection, Connector, StoreError, StoreSettings};

/// Accepts every write without touching the network
struct NullConnector;

struct NullConnection;

impl Connection for NullConnection {
    fn set(&mut self, _key: &str, value: &[u8]) -> Result<(), StoreError> {
        black_box(value);
        Ok(())
    }
}

impl Connector for NullConnector {
    fn connect(&self, _addr: &str) -> Result<Box<dyn Connection>, StoreError> {
        Ok(Box::new(NullConnection))
    }
}

fn batch(lines: usize) -> String {
    let types = ["idfa", "gaid", "adid", "dvid"];
    (0..lines)
        .map(|i| {
            format!(
                "{}\t{:032x}\t{}.25\t-{}.5\t{},{},{}\n",
                types[i % types.len()],
                i,
                i % 90,
                i % 180,
                i,
                i * 3,
                i * 7
            )
        })
        .collect()
}

fn bench_dispatch_workers(c: &mut Criterion) {
    let input = batch(10_000);
    let shards = ShardMap::with_defaults();
    let settings = StoreSettings::new(Arc::new(NullConnector));

    let mut group = c.benchmark_group("dispatch_10k_lines");
    group.throughput(Throughput::Elements(10_000));
    for workers in [1usize, 2, 4, 8] {
        let pool = PoolConfig {
            num_workers: workers,
            progress_every: 0,
            ..PoolConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(workers), &pool, |b, pool| {
            b.iter(|| {
                black_box(dispatch(Cursor::new(input.as_bytes()), &shards, &settings, pool).ok());
            });
        });
    }
    group.finish();
}

fn bench_dispatch_queue_depth(c: &mut Criterion) {
    let input = batch(10_000);
    let shards = ShardMap::with_defaults();
    let settings = StoreSettings::new(Arc::new(NullConnector));

    let mut group = c.benchmark_group("dispatch_queue_depth");
    for depth in [0usize, 64] {
        let pool = PoolConfig {
            queue_depth: depth,
            progress_every: 0,
            ..PoolConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(depth), &pool, |b, pool| {
            b.iter(|| {
                black_box(dispatch(Cursor::new(input.as_bytes()), &shards, &settings, pool).ok());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch_workers, bench_dispatch_queue_depth);
criterion_main!(benches);
