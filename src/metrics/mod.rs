//! Reporting helpers for pool observability.
//!
//! Provides a lock-free latency histogram and an INFO-style text report
//! over pool statistics, health, and per-bucket counters.

mod histogram;

pub use histogram::LatencyHistogram;

use std::fmt::Write;

use crate::pool::{BucketStats, HealthMetrics, MemoryPool, PoolStats, SizeClass};

/// Latency percentiles in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyPercentiles {
    pub count: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
}

/// Point-in-time report of a pool.
#[derive(Debug)]
pub struct PoolReport {
    pub stats: PoolStats,
    pub health: HealthMetrics,
    pub buckets: [(SizeClass, BucketStats); SizeClass::COUNT],
    /// (idle bytes, target bytes)
    pub memory: (usize, usize),
    pub acquire_latency: Option<LatencyPercentiles>,
}

impl PoolReport {
    /// Capture a report from `pool`.
    pub fn capture(pool: &MemoryPool) -> Self {
        Self {
            stats: pool.stats(),
            health: pool.health_metrics(),
            buckets: SizeClass::ALL.map(|class| (class, pool.bucket_stats(class))),
            memory: pool.memory_usage(),
            acquire_latency: None,
        }
    }

    /// Attach acquire latency percentiles.
    pub fn with_latency(mut self, latency: LatencyPercentiles) -> Self {
        self.acquire_latency = Some(latency);
        self
    }

    /// Format as INFO-style output, optionally limited to one section.
    pub fn to_info_string(&self, section: Option<&str>) -> String {
        let mut out = String::with_capacity(1024);

        let include_all = section.is_none();
        let section = section.unwrap_or("");
        let wants = |name: &str| include_all || section.eq_ignore_ascii_case(name);

        // Writing to a String cannot fail.
        if wants("stats") {
            let s = &self.stats;
            out.push_str("# Stats\r\n");
            let _ = write!(out, "total_allocations:{}\r\n", s.total_allocations);
            let _ = write!(out, "pool_hits:{}\r\n", s.pool_hits);
            let _ = write!(out, "pool_misses:{}\r\n", s.pool_misses);
            let _ = write!(out, "unpooled_allocations:{}\r\n", s.unpooled_allocations);
            let _ = write!(out, "current_pool_size:{}\r\n", s.current_pool_size);
            let _ = write!(out, "max_pool_size:{}\r\n", s.max_pool_size);
            let _ = write!(out, "capacity:{}\r\n", s.capacity);
            let _ = write!(out, "hit_rate:{:.4}\r\n", s.hit_rate());
            out.push_str("\r\n");
        }

        if wants("health") {
            let h = &self.health;
            out.push_str("# Health\r\n");
            let _ = write!(out, "pool_utilization:{:.4}\r\n", h.pool_utilization);
            let _ = write!(out, "memory_efficiency:{:.4}\r\n", h.memory_efficiency);
            let _ = write!(out, "performance_score:{:.4}\r\n", h.performance_score);
            let _ = write!(out, "status:{:?}\r\n", h.status);
            out.push_str("\r\n");
        }

        if wants("memory") {
            out.push_str("# Memory\r\n");
            let _ = write!(out, "idle_bytes:{}\r\n", self.memory.0);
            let _ = write!(out, "target_bytes:{}\r\n", self.memory.1);
            out.push_str("\r\n");
        }

        if wants("buckets") {
            out.push_str("# Buckets\r\n");
            for (class, b) in &self.buckets {
                let _ = write!(
                    out,
                    "bucket_{}:hits={},misses={},returns={},drops={},evictions={},idle={},target={}\r\n",
                    class.bytes(),
                    b.hits,
                    b.misses,
                    b.returns,
                    b.drops,
                    b.evictions,
                    b.idle,
                    b.target
                );
            }
            out.push_str("\r\n");
        }

        if let Some(latency) = &self.acquire_latency {
            if wants("latency") {
                out.push_str("# Latency (nanoseconds)\r\n");
                let _ = write!(out, "acquire_count:{}\r\n", latency.count);
                let _ = write!(out, "acquire_p50:{}\r\n", latency.p50);
                let _ = write!(out, "acquire_p95:{}\r\n", latency.p95);
                let _ = write!(out, "acquire_p99:{}\r\n", latency.p99);
                let _ = write!(out, "acquire_max:{}\r\n", latency.max);
                out.push_str("\r\n");
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_string() {
        let pool = MemoryPool::default();
        let buf = pool.acquire(1024).unwrap();
        pool.release(buf, 1024).unwrap();

        let info = PoolReport::capture(&pool).to_info_string(None);
        assert!(info.contains("# Stats"));
        assert!(info.contains("# Health"));
        assert!(info.contains("total_allocations:1"));
        assert!(info.contains("bucket_1024:hits=0,misses=1,returns=1"));
        assert!(!info.contains("# Latency"));
    }

    #[test]
    fn test_info_section_filter() {
        let pool = MemoryPool::default();
        let h = LatencyHistogram::new();
        h.record(120);

        let report = PoolReport::capture(&pool).with_latency(h.percentiles());
        let info = report.to_info_string(Some("latency"));

        assert!(info.contains("# Latency"));
        assert!(info.contains("acquire_count:1"));
        assert!(!info.contains("# Stats"));
        assert!(!info.contains("# Buckets"));
    }
}
