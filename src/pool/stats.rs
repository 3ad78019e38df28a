//! Pool statistics and health reporting.
//!
//! Counters use `Relaxed` ordering. Snapshots are eventually consistent,
//! but `total_allocations` is always derived from the same loaded hit and
//! miss values so `pool_hits + pool_misses == total_allocations` holds in
//! every snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};

const RELAXED: Ordering = Ordering::Relaxed;

/// Weights of the performance score. Stable for this crate version.
pub const SCORE_WEIGHT_HIT_RATE: f64 = 0.5;
pub const SCORE_WEIGHT_EFFICIENCY: f64 = 0.3;
pub const SCORE_WEIGHT_UTILIZATION: f64 = 0.2;

/// Per-bucket counters.
#[derive(Debug, Default)]
pub(crate) struct BucketCounters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    returns: AtomicUsize,
    drops: AtomicUsize,
    evictions: AtomicUsize,
}

impl BucketCounters {
    #[inline]
    pub fn hit(&self) {
        self.hits.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn miss(&self) {
        self.misses.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn returned(&self) {
        self.returns.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn dropped(&self) {
        self.drops.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn evicted(&self, count: usize) {
        self.evictions.fetch_add(count, RELAXED);
    }

    pub fn snapshot(&self, idle: usize, target: usize) -> BucketStats {
        BucketStats {
            hits: self.hits.load(RELAXED),
            misses: self.misses.load(RELAXED),
            returns: self.returns.load(RELAXED),
            drops: self.drops.load(RELAXED),
            evictions: self.evictions.load(RELAXED),
            idle,
            target,
        }
    }
}

/// Point-in-time statistics of one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Acquires served from an idle buffer
    pub hits: usize,
    /// Acquires that allocated
    pub misses: usize,
    /// Releases stored for reuse
    pub returns: usize,
    /// Releases dropped (bucket or pool full)
    pub drops: usize,
    /// Idle buffers removed by cleanup or shrinking
    pub evictions: usize,
    /// Idle buffers currently held
    pub idle: usize,
    /// Target capacity
    pub target: usize,
}

impl BucketStats {
    /// Acquires seen by this bucket.
    #[inline]
    pub fn demand(&self) -> usize {
        self.hits + self.misses
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.demand())
    }

    /// Idle buffers relative to target (0.0 when the target is zero).
    pub fn utilization(&self) -> f64 {
        ratio(self.idle, self.target)
    }
}

/// Idle buffers held across all buckets of a pool.
///
/// Buckets move the gauge inside the same critical section that stores or
/// removes the buffer, so every decrement is ordered after the increment
/// for the same buffer and the gauge never drifts from the bucket counts.
#[derive(Debug)]
pub(crate) struct IdleGauge {
    current: AtomicUsize,
    high_water: AtomicUsize,
    ceiling: usize,
}

impl IdleGauge {
    pub fn new(ceiling: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            ceiling,
        }
    }

    /// Reserve room for one more idle buffer. False at the ceiling.
    pub fn reserve(&self) -> bool {
        let mut current = self.current.load(RELAXED);
        loop {
            if current >= self.ceiling {
                return false;
            }
            match self
                .current
                .compare_exchange_weak(current, current + 1, RELAXED, RELAXED)
            {
                Ok(_) => {
                    self.high_water.fetch_max(current + 1, RELAXED);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// `count` idle buffers left a bucket.
    #[inline]
    pub fn release(&self, count: usize) {
        if count > 0 {
            self.current.fetch_sub(count, RELAXED);
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current.load(RELAXED)
    }

    #[inline]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// Pool-wide acquire counters.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    unpooled: AtomicUsize,
    unpooled_bytes: AtomicUsize,
}

impl PoolCounters {
    #[inline]
    pub fn hit(&self) {
        self.hits.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn miss(&self) {
        self.misses.fetch_add(1, RELAXED);
    }

    /// Unpooled requests count as pool misses.
    #[inline]
    pub fn unpooled(&self, bytes: usize) {
        self.misses.fetch_add(1, RELAXED);
        self.unpooled.fetch_add(1, RELAXED);
        self.unpooled_bytes.fetch_add(bytes, RELAXED);
    }

    #[inline]
    pub fn unpooled_bytes(&self) -> usize {
        self.unpooled_bytes.load(RELAXED)
    }

    pub fn snapshot(&self, idle: &IdleGauge) -> PoolStats {
        let pool_hits = self.hits.load(RELAXED);
        let pool_misses = self.misses.load(RELAXED);
        PoolStats {
            total_allocations: pool_hits + pool_misses,
            pool_hits,
            pool_misses,
            unpooled_allocations: self.unpooled.load(RELAXED),
            current_pool_size: idle.current(),
            max_pool_size: idle.high_water.load(RELAXED),
            capacity: idle.ceiling(),
        }
    }
}

/// Pool-wide statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Every acquire, pooled or not
    pub total_allocations: usize,
    /// Acquires served from an idle buffer
    pub pool_hits: usize,
    /// Acquires that allocated, including unpooled ones
    pub pool_misses: usize,
    /// Acquires above the largest size class
    pub unpooled_allocations: usize,
    /// Idle buffers currently held across all buckets
    pub current_pool_size: usize,
    /// High-water mark of `current_pool_size`
    pub max_pool_size: usize,
    /// Configured ceiling on idle buffers
    pub capacity: usize,
}

impl PoolStats {
    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        ratio(self.pool_hits, self.total_allocations)
    }

    /// Field-wise sum of two snapshots.
    pub fn combine(self, other: PoolStats) -> PoolStats {
        PoolStats {
            total_allocations: self.total_allocations + other.total_allocations,
            pool_hits: self.pool_hits + other.pool_hits,
            pool_misses: self.pool_misses + other.pool_misses,
            unpooled_allocations: self.unpooled_allocations + other.unpooled_allocations,
            current_pool_size: self.current_pool_size + other.current_pool_size,
            max_pool_size: self.max_pool_size + other.max_pool_size,
            capacity: self.capacity + other.capacity,
        }
    }
}

/// Coarse health classification derived from the performance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub(crate) fn from_score(score: f64) -> Self {
        if score >= 0.6 {
            HealthStatus::Healthy
        } else if score >= 0.3 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        }
    }
}

/// Derived health figures, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthMetrics {
    /// Idle buffers over the configured ceiling
    pub pool_utilization: f64,
    pub hit_rate: f64,
    /// Bytes served from reuse over bytes requested
    pub memory_efficiency: f64,
    /// Weighted composite, higher is better
    pub performance_score: f64,
    pub status: HealthStatus,
}

impl HealthMetrics {
    pub(crate) fn compute(stats: &PoolStats, reused_bytes: usize, requested_bytes: usize) -> Self {
        let pool_utilization = ratio(stats.current_pool_size, stats.capacity).min(1.0);
        let hit_rate = stats.hit_rate();
        let memory_efficiency = ratio(reused_bytes, requested_bytes).min(1.0);
        let performance_score = (SCORE_WEIGHT_HIT_RATE * hit_rate
            + SCORE_WEIGHT_EFFICIENCY * memory_efficiency
            + SCORE_WEIGHT_UTILIZATION * pool_utilization)
            .clamp(0.0, 1.0);

        Self {
            pool_utilization,
            hit_rate,
            memory_efficiency,
            performance_score,
            status: HealthStatus::from_score(performance_score),
        }
    }

    /// Average of `parts`, each weighted by its allocation count.
    ///
    /// All figures are zero when no part has seen an allocation.
    pub(crate) fn weighted(parts: &[(HealthMetrics, usize)]) -> Self {
        let total: usize = parts.iter().map(|(_, n)| n).sum();
        let avg = |field: fn(&HealthMetrics) -> f64| {
            parts
                .iter()
                .map(|(m, n)| field(m) * ratio(*n, total))
                .sum::<f64>()
        };
        let performance_score = avg(|m| m.performance_score);

        Self {
            pool_utilization: avg(|m| m.pool_utilization),
            hit_rate: avg(|m| m.hit_rate),
            memory_efficiency: avg(|m| m.memory_efficiency),
            performance_score,
            status: HealthStatus::from_score(performance_score),
        }
    }
}

#[inline]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
