use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use iopool::config::StressConfig;
use iopool::metrics::{LatencyHistogram, PoolReport};
use iopool::pool::{MemoryPool, PooledBuffer};

use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration
    let config = StressConfig::parse_args();

    // Initialize tracing
    let log_level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let pool_config = config.pool_config();
    info!("iopool-stress v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: {} threads x {} iterations, per_class={}, max_pool_size={}, max_size={}",
        config.threads,
        config.iterations,
        pool_config.initial_per_class,
        pool_config.max_pool_size,
        config.max_size
    );

    let pool = MemoryPool::new(pool_config);
    let latency = LatencyHistogram::new();
    let failures = AtomicU64::new(0);
    let done = AtomicBool::new(false);

    let start = Instant::now();
    thread::scope(|s| {
        // Maintenance runs until every worker finishes
        if config.tune_interval_ms > 0 {
            let interval = Duration::from_millis(config.tune_interval_ms);
            let (pool, done) = (&pool, &done);
            s.spawn(move || {
                while !done.load(Ordering::Acquire) {
                    thread::sleep(interval);
                    pool.auto_tune();
                    let evicted = pool.cleanup_default();
                    debug!("Maintenance pass evicted {} buffers", evicted);
                }
            });
        }

        let workers: Vec<_> = (0..config.threads.max(1))
            .map(|id| {
                let (pool, latency, failures, config) = (&pool, &latency, &failures, &config);
                s.spawn(move || run_worker(id, pool, latency, failures, config))
            })
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!("Worker panicked");
            }
        }
        done.store(true, Ordering::Release);
    });
    let elapsed = start.elapsed();

    let ops = latency.count();
    info!(
        "Completed {} acquires in {:.3}s ({:.0} ops/sec), {} failures",
        ops,
        elapsed.as_secs_f64(),
        ops as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        failures.load(Ordering::Relaxed)
    );

    let report = PoolReport::capture(&pool).with_latency(latency.percentiles());
    print!("{}", report.to_info_string(None));

    Ok(())
}

/// Acquire and release buffers of varying size, keeping up to `hold` live.
fn run_worker(
    id: usize,
    pool: &MemoryPool,
    latency: &LatencyHistogram,
    failures: &AtomicU64,
    config: &StressConfig,
) {
    let max_size = config.max_size.max(1);
    let mut held = VecDeque::with_capacity(config.hold.max(1));
    let mut rng = SizeSequence::new(id as u64);

    for _ in 0..config.iterations {
        let size = rng.next_size(max_size);
        let started = Instant::now();
        match PooledBuffer::with_pool(pool, size) {
            Ok(mut buf) => {
                latency.record(started.elapsed().as_nanos() as u64);
                buf[0] = id as u8;
                held.push_back(buf);
            }
            Err(e) => {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!("Worker {} failed to acquire {} bytes: {}", id, size, e);
            }
        }
        if held.len() > config.hold {
            // Dropping returns the buffer to the pool
            held.pop_front();
        }
    }
}

/// xorshift64 stream of request sizes.
struct SizeSequence(u64);

impl SizeSequence {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    fn next_size(&mut self, max: usize) -> usize {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x % max as u64) as usize + 1
    }
}
