//! The size-classed buffer pool.

use std::fmt;
use std::time::Duration;

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};

use super::bucket::{Bucket, BucketMode};
use super::buffer::Buffer;
use super::size_class::SizeClass;
use super::stats::{BucketStats, HealthMetrics, IdleGauge, PoolCounters, PoolStats};

/// Default idle age for [`MemoryPool::cleanup_default`].
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Acquires a bucket must see between two `auto_tune` passes before it is adjusted.
pub const AUTO_TUNE_MIN_SAMPLES: usize = 64;

const LOW_HIT_RATE: f64 = 0.5;
const HIGH_UTILIZATION: f64 = 0.9;
const LOW_UTILIZATION: f64 = 0.25;

/// Pool of reusable byte buffers in four size classes.
///
/// All methods take `&self` and may be called from any number of threads.
pub struct MemoryPool {
    buckets: [CachePadded<Bucket>; SizeClass::COUNT],
    /// Idle buffers across all buckets, capped at the configured ceiling
    idle: IdleGauge,
    counters: PoolCounters,
    /// (hits, misses) per bucket at the previous `auto_tune`
    tune_marks: Mutex<[(usize, usize); SizeClass::COUNT]>,
}

impl MemoryPool {
    /// Create a pool from a config.
    ///
    /// Each bucket targets `initial_per_class` idle buffers, reduced so that
    /// the four targets fit under `max_pool_size`. Buckets whose target
    /// reaches the lock-free threshold use a bounded lock-free queue.
    pub fn new(config: PoolConfig) -> Self {
        let target = config.per_class_target(SizeClass::COUNT);
        let idle = IdleGauge::new(config.max_pool_size);
        let buckets = SizeClass::ALL.map(|class| {
            CachePadded::new(Bucket::new(class, target, config.max_pool_size, &idle))
        });

        Self {
            buckets,
            idle,
            counters: PoolCounters::default(),
            tune_marks: Mutex::new([(0, 0); SizeClass::COUNT]),
        }
    }

    /// Create a pool with explicit sizes.
    pub fn with_sizes(initial_per_class: usize, max_pool_size: usize) -> Self {
        Self::new(PoolConfig::new(initial_per_class, max_pool_size))
    }

    #[inline]
    fn bucket(&self, class: SizeClass) -> &Bucket {
        &self.buckets[class.index()]
    }

    /// Acquire a buffer for `size` bytes.
    ///
    /// Pooled sizes return a buffer of the full class length; sizes above
    /// the largest class return exactly `size` bytes, unpooled.
    pub fn acquire(&self, size: usize) -> Result<Buffer> {
        match SizeClass::resolve(size)? {
            Some(class) => Ok(self.acquire_class(class)),
            None => {
                self.counters.unpooled(size);
                trace!("Unpooled allocation of {} bytes", size);
                Ok(Buffer::new(size))
            }
        }
    }

    /// Acquire a buffer of a named class.
    pub fn acquire_class(&self, class: SizeClass) -> Buffer {
        match self.bucket(class).take(&self.idle) {
            Some(buffer) => {
                self.counters.hit();
                buffer
            }
            None => {
                self.counters.miss();
                trace!("Pool miss for {:?}", class);
                Buffer::new(class.bytes())
            }
        }
    }

    /// Return a buffer acquired with `size`.
    ///
    /// Fails with `SizeMismatch` when `size` does not map to the class the
    /// buffer came from; the buffer is dropped and no bucket is touched.
    pub fn release(&self, buffer: Buffer, size: usize) -> Result<()> {
        let class = SizeClass::resolve(size)?;
        let expected = class.map_or(size, SizeClass::bytes);
        if buffer.len() != expected {
            warn!(
                "Rejected release of {} byte buffer as size {}",
                buffer.len(),
                size
            );
            return Err(Error::SizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }

        let Some(class) = class else {
            // Unpooled: dropping frees it.
            return Ok(());
        };
        // A refused buffer is dropped here, outside the bucket.
        let _ = self.bucket(class).put(buffer, &self.idle);
        Ok(())
    }

    /// Pool-wide statistics snapshot.
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(&self.idle)
    }

    /// Hits over total allocations, 0.0 before any allocation.
    pub fn hit_rate(&self) -> f64 {
        self.stats().hit_rate()
    }

    /// Statistics of one bucket.
    pub fn bucket_stats(&self, class: SizeClass) -> BucketStats {
        self.bucket(class).stats()
    }

    /// Target capacity of one bucket.
    pub fn bucket_target(&self, class: SizeClass) -> usize {
        self.bucket(class).target()
    }

    /// Storage strategy of one bucket.
    pub fn bucket_mode(&self, class: SizeClass) -> BucketMode {
        self.bucket(class).mode()
    }

    /// Ceiling on idle buffers across all buckets.
    pub fn capacity(&self) -> usize {
        self.idle.ceiling()
    }

    /// Derived health figures.
    pub fn health_metrics(&self) -> HealthMetrics {
        let stats = self.stats();
        let mut reused = 0usize;
        let mut requested = self.counters.unpooled_bytes();
        for bucket in &self.buckets {
            let bs = bucket.stats();
            let bytes = bucket.class().bytes();
            reused = reused.saturating_add(bs.hits.saturating_mul(bytes));
            requested = requested.saturating_add(bs.demand().saturating_mul(bytes));
        }
        HealthMetrics::compute(&stats, reused, requested)
    }

    /// Bytes held idle, and bytes the bucket targets allow.
    pub fn memory_usage(&self) -> (usize, usize) {
        self.buckets.iter().fold((0, 0), |(current, max), bucket| {
            let bytes = bucket.class().bytes();
            (
                current + bucket.idle() * bytes,
                max + bucket.target().saturating_mul(bytes),
            )
        })
    }

    /// Evict idle buffers unused for at least `max_age`.
    ///
    /// A zero age evicts every idle buffer. Returns the number evicted.
    pub fn cleanup_old_buffers(&self, max_age: Duration) -> usize {
        let mut total = 0;
        for bucket in &self.buckets {
            total += bucket.evict_older_than(max_age, &self.idle).len();
        }
        if total > 0 {
            debug!("Evicted {} idle buffers older than {:?}", total, max_age);
        }
        total
    }

    /// [`cleanup_old_buffers`](Self::cleanup_old_buffers) with [`DEFAULT_MAX_AGE`].
    pub fn cleanup_default(&self) -> usize {
        self.cleanup_old_buffers(DEFAULT_MAX_AGE)
    }

    /// Redistribute `new_size` idle buffers of capacity across the buckets.
    ///
    /// Each bucket gets a share proportional to the acquires it has served
    /// so far, or an equal share when none has. The total is clamped to the
    /// pool ceiling, and idle buffers above a bucket's new target are
    /// evicted immediately.
    pub fn resize_pool(&self, new_size: usize) {
        let total = new_size.min(self.capacity());
        let demand = self.buckets.each_ref().map(|b| b.stats().demand());
        let demand_sum: usize = demand.iter().sum();

        let targets: [usize; SizeClass::COUNT] = if demand_sum == 0 {
            let share = total / SizeClass::COUNT;
            let extra = total % SizeClass::COUNT;
            std::array::from_fn(|i| share + usize::from(i < extra))
        } else {
            demand.map(|d| (total as u128 * d as u128 / demand_sum as u128) as usize)
        };

        let mut evicted = 0;
        for (bucket, target) in self.buckets.iter().zip(targets) {
            evicted += bucket
                .set_target(target.min(bucket.max_target()), &self.idle)
                .len();
        }
        debug!(
            "Resized pool to {} buffers, targets {:?}, evicted {}",
            total, targets, evicted
        );
    }

    /// Adjust bucket targets from recent hit rate and utilization.
    ///
    /// A bucket with a low hit rate whose idle buffers fill its target grows
    /// by half; a bucket using under a quarter of its target shrinks by a
    /// quarter. Buckets with fewer than [`AUTO_TUNE_MIN_SAMPLES`] acquires
    /// since the last pass are left alone. The sum of targets never exceeds
    /// the pool ceiling.
    pub fn auto_tune(&self) {
        let mut marks = self.tune_marks.lock();
        let mut total: usize = self.buckets.iter().map(|b| b.target()).sum();

        for (bucket, mark) in self.buckets.iter().zip(marks.iter_mut()) {
            let stats = bucket.stats();
            let hits = stats.hits.saturating_sub(mark.0);
            let misses = stats.misses.saturating_sub(mark.1);
            if hits + misses < AUTO_TUNE_MIN_SAMPLES {
                continue;
            }
            *mark = (stats.hits, stats.misses);

            let hit_rate = hits as f64 / (hits + misses) as f64;
            let utilization = stats.utilization();
            let target = stats.target;

            let new_target = if hit_rate < LOW_HIT_RATE && utilization >= HIGH_UTILIZATION {
                let headroom = self.capacity().saturating_sub(total);
                let grow = (target / 2).max(1).min(headroom);
                (target + grow).min(bucket.max_target())
            } else if utilization < LOW_UTILIZATION {
                target - target / 4
            } else {
                continue;
            };
            if new_target == target {
                continue;
            }

            total = total - target + new_target;
            bucket.set_target(new_target, &self.idle);
            debug!(
                "Auto-tuned {:?} bucket: target {} -> {} (hit rate {:.2}, utilization {:.2})",
                bucket.class(),
                target,
                new_target,
                hit_rate,
                utilization
            );
        }
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("capacity", &self.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}
