//! Tiered pool: three independent [`MemoryPool`]s split by request size.
//!
//! Small, medium and large requests never contend on the same buckets,
//! and each tier is sized for its own traffic.

use std::time::Duration;

use crate::config::TieredConfig;
use crate::error::Result;

use super::buffer::Buffer;
use super::memory_pool::{MemoryPool, DEFAULT_MAX_AGE};
use super::pooled::BufferSource;
use super::stats::{HealthMetrics, PoolStats};

/// Request size category of a [`TieredMemoryPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Up to 4 KiB
    Small,
    /// Up to 32 KiB
    Medium,
    /// Everything larger, including unpooled sizes
    Large,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Small, Tier::Medium, Tier::Large];

    /// Largest request served by the small tier.
    pub const SMALL_MAX: usize = 4096;

    /// Largest request served by the medium tier.
    pub const MEDIUM_MAX: usize = 32768;

    /// Tier serving `size`. Invalid sizes are rejected by the tier's pool.
    #[inline]
    pub fn for_size(size: usize) -> Tier {
        if size <= Self::SMALL_MAX {
            Tier::Small
        } else if size <= Self::MEDIUM_MAX {
            Tier::Medium
        } else {
            Tier::Large
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

/// Pool of pools, one [`MemoryPool`] per [`Tier`].
///
/// Acquire and release route by size, so a buffer always returns to the
/// tier it came from when released with the size it was acquired with.
#[derive(Debug)]
pub struct TieredMemoryPool {
    pools: [MemoryPool; 3],
}

impl TieredMemoryPool {
    pub fn new(config: TieredConfig) -> Self {
        Self {
            pools: [
                MemoryPool::new(config.small),
                MemoryPool::new(config.medium),
                MemoryPool::new(config.large),
            ],
        }
    }

    /// The pool behind one tier.
    #[inline]
    pub fn pool(&self, tier: Tier) -> &MemoryPool {
        &self.pools[tier.index()]
    }

    pub fn acquire(&self, size: usize) -> Result<Buffer> {
        self.pool(Tier::for_size(size)).acquire(size)
    }

    pub fn release(&self, buffer: Buffer, size: usize) -> Result<()> {
        self.pool(Tier::for_size(size)).release(buffer, size)
    }

    /// Statistics summed over all tiers.
    pub fn stats(&self) -> PoolStats {
        self.pools
            .iter()
            .map(MemoryPool::stats)
            .fold(PoolStats::default(), PoolStats::combine)
    }

    /// Statistics of one tier.
    pub fn tier_stats(&self, tier: Tier) -> PoolStats {
        self.pool(tier).stats()
    }

    pub fn hit_rate(&self) -> f64 {
        self.stats().hit_rate()
    }

    pub fn tier_hit_rate(&self, tier: Tier) -> f64 {
        self.pool(tier).hit_rate()
    }

    /// (idle bytes, target bytes) summed over all tiers.
    pub fn memory_usage(&self) -> (usize, usize) {
        self.pools.iter().fold((0, 0), |(current, max), pool| {
            let (c, m) = pool.memory_usage();
            (current + c, max.saturating_add(m))
        })
    }

    /// Health of each tier averaged by its share of allocations.
    pub fn health_metrics(&self) -> HealthMetrics {
        let parts = self
            .pools
            .each_ref()
            .map(|pool| (pool.health_metrics(), pool.stats().total_allocations));
        HealthMetrics::weighted(&parts)
    }

    /// Evict idle buffers older than `max_age` from every tier.
    pub fn cleanup_old_buffers(&self, max_age: Duration) -> usize {
        self.pools
            .iter()
            .map(|pool| pool.cleanup_old_buffers(max_age))
            .sum()
    }

    pub fn cleanup_default(&self) -> usize {
        self.cleanup_old_buffers(DEFAULT_MAX_AGE)
    }

    /// Give each tier a third of `new_size`.
    pub fn resize_pool(&self, new_size: usize) {
        for pool in &self.pools {
            pool.resize_pool(new_size / Tier::ALL.len());
        }
    }

    pub fn auto_tune(&self) {
        for pool in &self.pools {
            pool.auto_tune();
        }
    }
}

impl Default for TieredMemoryPool {
    fn default() -> Self {
        Self::new(TieredConfig::default())
    }
}

impl BufferSource for TieredMemoryPool {
    fn acquire(&self, size: usize) -> Result<Buffer> {
        TieredMemoryPool::acquire(self, size)
    }

    fn release(&self, buffer: Buffer, size: usize) -> Result<()> {
        TieredMemoryPool::release(self, buffer, size)
    }
}
