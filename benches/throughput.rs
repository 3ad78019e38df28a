use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use iopool::config::PoolConfig;
use iopool::pool::{MemoryPool, PooledBuffer, SizeClass, TieredMemoryPool};

/// Benchmark single-threaded acquire/release per size class
fn bench_acquire_release(c: &mut Criterion) {
    let pool = MemoryPool::default();

    let mut group = c.benchmark_group("acquire_release");
    group.throughput(Throughput::Elements(1));

    for class in SizeClass::ALL {
        group.bench_with_input(
            BenchmarkId::from_parameter(class.bytes()),
            &class.bytes(),
            |b, &size| {
                b.iter(|| {
                    let buf = pool.acquire(black_box(size)).unwrap();
                    pool.release(buf, size).unwrap();
                })
            },
        );
    }

    // Above the largest class, served by the allocator
    group.bench_function("unpooled_128k", |b| {
        b.iter(|| {
            let buf = pool.acquire(black_box(128 * 1024)).unwrap();
            pool.release(buf, 128 * 1024).unwrap();
        })
    });

    group.finish();
}

/// Benchmark size routing through the tiered pool
fn bench_tiered(c: &mut Criterion) {
    let pool = TieredMemoryPool::default();

    let mut group = c.benchmark_group("tiered");
    group.throughput(Throughput::Elements(1));

    for size in [2048usize, 20_000, 60_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let buf = pool.acquire(black_box(size)).unwrap();
                pool.release(buf, size).unwrap();
            })
        });
    }

    group.finish();
}

/// Benchmark the RAII handle against the raw allocator
fn bench_pooled_vs_alloc(c: &mut Criterion) {
    let pool = MemoryPool::default();

    let mut group = c.benchmark_group("pooled_vs_alloc");
    group.throughput(Throughput::Elements(1));

    group.bench_function("pooled_buffer_4k", |b| {
        b.iter(|| {
            let mut buf = PooledBuffer::with_pool(&pool, 4096).unwrap();
            buf[0] = 1;
            black_box(buf.as_slice().len());
        })
    });

    group.bench_function("vec_4k", |b| {
        b.iter(|| {
            let mut buf = vec![0u8; 4096];
            buf[0] = 1;
            black_box(buf.len());
        })
    });

    group.finish();
}

/// Benchmark contended acquire/release for both bucket modes
fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.throughput(Throughput::Elements(4 * 1000));

    for (name, config) in [
        ("locked_4_threads", PoolConfig::default()),
        ("lock_free_4_threads", PoolConfig::size_optimized()),
    ] {
        let pool = Arc::new(MemoryPool::new(config));
        group.bench_function(name, |b| {
            b.iter(|| {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        let pool = pool.clone();
                        std::thread::spawn(move || {
                            for _ in 0..1000 {
                                let buf = pool.acquire(4096).unwrap();
                                black_box(buf.as_ptr());
                                pool.release(buf, 4096).unwrap();
                            }
                        })
                    })
                    .collect();

                for h in handles {
                    h.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

/// Benchmark maintenance passes on a warm pool
fn bench_maintenance(c: &mut Criterion) {
    let pool = MemoryPool::default();
    for _ in 0..100 {
        let buf = pool.acquire(1024).unwrap();
        pool.release(buf, 1024).unwrap();
    }

    let mut group = c.benchmark_group("maintenance");
    group.bench_function("stats", |b| b.iter(|| black_box(pool.stats())));
    group.bench_function("health_metrics", |b| {
        b.iter(|| black_box(pool.health_metrics()))
    });
    group.bench_function("auto_tune", |b| b.iter(|| pool.auto_tune()));
    group.finish();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_tiered,
    bench_pooled_vs_alloc,
    bench_concurrent,
    bench_maintenance,
);
criterion_main!(benches);
