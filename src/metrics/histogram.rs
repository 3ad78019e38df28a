//! Lock-free latency histogram with power-of-two buckets.
//!
//! Bucket `i` counts samples in `[2^(i-1), 2^i)` nanoseconds, bucket 0
//! counts zero. Percentiles report the upper bound of the bucket they fall
//! in, so they over-estimate by at most a factor of two.

use std::sync::atomic::{AtomicU64, Ordering};

use super::LatencyPercentiles;

/// One bucket per bit of a u64, plus zero.
const NUM_BUCKETS: usize = 65;

pub struct LatencyHistogram {
    buckets: [AtomicU64; NUM_BUCKETS],
    count: AtomicU64,
    max: AtomicU64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record a latency in nanoseconds.
    #[inline]
    pub fn record(&self, value_ns: u64) {
        self.buckets[Self::value_to_bucket(value_ns)].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(value_ns, Ordering::Relaxed);
    }

    #[inline]
    fn value_to_bucket(value_ns: u64) -> usize {
        (u64::BITS - value_ns.leading_zeros()) as usize
    }

    /// Largest value that maps to `bucket`.
    #[inline]
    fn bucket_upper(bucket: usize) -> u64 {
        match bucket {
            0 => 0,
            64.. => u64::MAX,
            b => (1u64 << b) - 1,
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Calculate p50, p95, p99 and max.
    pub fn percentiles(&self) -> LatencyPercentiles {
        let counts: [u64; NUM_BUCKETS] =
            std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return LatencyPercentiles::default();
        }
        let max = self.max.load(Ordering::Relaxed);

        let quantile = |q: u64| {
            let rank = (total * q).div_ceil(100).max(1);
            let mut cumulative = 0u64;
            for (bucket, &count) in counts.iter().enumerate() {
                cumulative += count;
                if cumulative >= rank {
                    return Self::bucket_upper(bucket).min(max);
                }
            }
            max
        };

        LatencyPercentiles {
            count: total,
            p50: quantile(50),
            p95: quantile(95),
            p99: quantile(99),
            max,
        }
    }

    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}
