pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;

pub use config::{PoolConfig, StressConfig, TieredConfig};
pub use error::{Error, Result};
pub use pool::{
    global_pool, global_tiered_pool, Buffer, BufferSource, GlobalMemoryPool, HealthMetrics,
    HealthStatus, MemoryPool, PoolStats, PooledBuffer, SizeClass, Tier, TieredMemoryPool,
};
