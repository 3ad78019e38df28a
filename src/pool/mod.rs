//! Size-classed buffer pooling for hot I/O paths.
//!
//! Buffers are grouped into four size classes, each served by its own
//! bucket. Small targets use a mutex-guarded arena; targets of
//! [`LOCK_FREE_THRESHOLD`] buffers or more use a bounded lock-free queue.
//! [`PooledBuffer`] returns its buffer on every exit path.
//! [`TieredMemoryPool`] splits traffic by request size across three pools.

mod bucket;
mod buffer;
mod global;
mod memory_pool;
mod pooled;
mod size_class;
mod stats;
mod tiered;

pub use bucket::{BucketMode, LOCK_FREE_PREFILL, LOCK_FREE_THRESHOLD};
pub use buffer::Buffer;
pub use global::{global_pool, global_tiered_pool, GlobalMemoryPool};
pub use memory_pool::{MemoryPool, AUTO_TUNE_MIN_SAMPLES, DEFAULT_MAX_AGE};
pub use pooled::{BufferSource, PooledBuffer};
pub use size_class::{validate_size, SizeClass, ALIGNMENT, ALIGNMENT_THRESHOLD, MAX_BUFFER_SIZE};
pub use stats::{
    BucketStats, HealthMetrics, HealthStatus, PoolStats, SCORE_WEIGHT_EFFICIENCY,
    SCORE_WEIGHT_HIT_RATE, SCORE_WEIGHT_UTILIZATION,
};
pub use tiered::{Tier, TieredMemoryPool};
