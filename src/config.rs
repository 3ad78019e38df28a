use clap::{Parser, ValueEnum};

/// Construction parameters for a [`MemoryPool`](crate::pool::MemoryPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Target number of idle buffers kept per size class
    pub initial_per_class: usize,

    /// Ceiling on idle buffers across all size classes
    pub max_pool_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_per_class: 400,
            max_pool_size: 2000,
        }
    }
}

impl PoolConfig {
    /// Create a config with explicit sizes.
    pub fn new(initial_per_class: usize, max_pool_size: usize) -> Self {
        Self {
            initial_per_class,
            max_pool_size,
        }
    }

    /// Larger pools for busier servers. Buckets stay lock-based.
    pub fn optimized() -> Self {
        Self::new(800, 4000)
    }

    /// Pools large enough that every bucket switches to the lock-free queue.
    pub fn size_optimized() -> Self {
        Self::new(1200, 6000)
    }

    /// Per-bucket target after fitting all classes under the ceiling.
    pub(crate) fn per_class_target(&self, classes: usize) -> usize {
        self.initial_per_class.min(self.max_pool_size / classes.max(1))
    }
}

/// Per-tier configs of a [`TieredMemoryPool`](crate::pool::TieredMemoryPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieredConfig {
    /// Requests up to 4 KiB
    pub small: PoolConfig,
    /// Requests up to 32 KiB
    pub medium: PoolConfig,
    /// Larger requests
    pub large: PoolConfig,
}

impl Default for TieredConfig {
    fn default() -> Self {
        Self {
            small: PoolConfig::new(600, 2000),
            medium: PoolConfig::new(200, 800),
            large: PoolConfig::new(100, 400),
        }
    }
}

/// Pool size presets selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Default,
    Optimized,
    SizeOptimized,
}

/// iopool-stress - concurrent workload driver for the buffer pool
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct StressConfig {
    /// Worker threads
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Acquire/release cycles per worker
    #[arg(short, long, default_value = "100000")]
    pub iterations: usize,

    /// Pool size preset
    #[arg(long, value_enum, default_value = "default")]
    pub preset: Preset,

    /// Override the per-class target of the preset
    #[arg(long)]
    pub initial_per_class: Option<usize>,

    /// Override the idle buffer ceiling of the preset
    #[arg(long)]
    pub max_pool_size: Option<usize>,

    /// Largest request size in bytes
    #[arg(long, default_value = "16384")]
    pub max_size: usize,

    /// Buffers each worker keeps outstanding at once
    #[arg(long, default_value = "8")]
    pub hold: usize,

    /// Run auto-tune and cleanup every this many milliseconds (0 disables)
    #[arg(long, default_value = "0")]
    pub tune_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl StressConfig {
    /// Parse configuration from command line arguments
    pub fn parse_args() -> Self {
        StressConfig::parse()
    }

    /// Pool config from the preset and overrides.
    pub fn pool_config(&self) -> PoolConfig {
        let base = match self.preset {
            Preset::Default => PoolConfig::default(),
            Preset::Optimized => PoolConfig::optimized(),
            Preset::SizeOptimized => PoolConfig::size_optimized(),
        };
        PoolConfig {
            initial_per_class: self.initial_per_class.unwrap_or(base.initial_per_class),
            max_pool_size: self.max_pool_size.unwrap_or(base.max_pool_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_per_class, 400);
        assert_eq!(config.max_pool_size, 2000);
        assert_eq!(config.per_class_target(4), 400);
    }

    #[test]
    fn test_presets() {
        assert_eq!(PoolConfig::optimized(), PoolConfig::new(800, 4000));
        assert_eq!(PoolConfig::size_optimized(), PoolConfig::new(1200, 6000));
    }

    #[test]
    fn test_target_clamped_to_ceiling() {
        let config = PoolConfig::new(1000, 100);
        assert_eq!(config.per_class_target(4), 25);
    }

    #[test]
    fn test_tiered_defaults() {
        let config = TieredConfig::default();
        assert_eq!(config.small.per_class_target(4), 500);
        assert_eq!(config.medium.per_class_target(4), 200);
        assert_eq!(config.large.per_class_target(4), 100);
    }

    #[test]
    fn test_stress_config_overrides() {
        let config = StressConfig::parse_from([
            "iopool-stress",
            "--preset",
            "size-optimized",
            "--max-pool-size",
            "8000",
        ]);
        assert_eq!(config.threads, 4);
        assert_eq!(config.pool_config(), PoolConfig::new(1200, 8000));
    }

    #[test]
    fn test_stress_config_defaults() {
        let config = StressConfig::parse_from(["iopool-stress"]);
        assert_eq!(config.preset, Preset::Default);
        assert_eq!(config.pool_config(), PoolConfig::default());
        assert_eq!(config.log_level, "info");
    }
}
