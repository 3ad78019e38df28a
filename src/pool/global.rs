use std::sync::OnceLock;

use crate::config::PoolConfig;

use super::memory_pool::MemoryPool;
use super::tiered::TieredMemoryPool;

/// Process-wide pool, built on first access.
static GLOBAL_POOL: OnceLock<MemoryPool> = OnceLock::new();

/// Process-wide tiered pool, independent of the plain global pool.
static GLOBAL_TIERED_POOL: OnceLock<TieredMemoryPool> = OnceLock::new();

/// Get the global memory pool.
pub fn global_pool() -> &'static MemoryPool {
    GLOBAL_POOL.get_or_init(MemoryPool::default)
}

/// Get the global tiered pool.
pub fn global_tiered_pool() -> &'static TieredMemoryPool {
    GLOBAL_TIERED_POOL.get_or_init(TieredMemoryPool::default)
}

/// Accessors and factories for shared pools.
///
/// Code that wants an isolated pool (tests in particular) should build a
/// [`MemoryPool`] and pass it by reference instead of using the global one.
pub struct GlobalMemoryPool;

impl GlobalMemoryPool {
    /// The process-wide pool. Same as [`global_pool`].
    pub fn instance() -> &'static MemoryPool {
        global_pool()
    }

    /// The process-wide tiered pool. Same as [`global_tiered_pool`].
    pub fn tiered_instance() -> &'static TieredMemoryPool {
        global_tiered_pool()
    }

    /// A pool sized for busier servers.
    pub fn create_optimized() -> MemoryPool {
        MemoryPool::new(PoolConfig::optimized())
    }

    /// A pool whose buckets all use the lock-free queue.
    pub fn create_size_optimized() -> MemoryPool {
        MemoryPool::new(PoolConfig::size_optimized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{BucketMode, SizeClass};

    #[test]
    fn test_instance_is_singleton() {
        let a = GlobalMemoryPool::instance() as *const MemoryPool;
        let b = std::thread::spawn(|| global_pool() as *const MemoryPool as usize)
            .join()
            .unwrap();
        assert_eq!(a as usize, b);
        assert_eq!(global_pool().capacity(), 2000);
    }

    #[test]
    fn test_tiered_instance_is_singleton() {
        let a = GlobalMemoryPool::tiered_instance() as *const TieredMemoryPool as usize;
        let b = std::thread::spawn(|| global_tiered_pool() as *const TieredMemoryPool as usize)
            .join()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(global_tiered_pool().stats().capacity, 3200);
    }

    #[test]
    fn test_factories() {
        let optimized = GlobalMemoryPool::create_optimized();
        assert_eq!(optimized.capacity(), 4000);
        assert_eq!(optimized.bucket_target(SizeClass::Small), 800);
        assert_eq!(optimized.bucket_mode(SizeClass::Small), BucketMode::Locked);

        let size_optimized = GlobalMemoryPool::create_size_optimized();
        assert_eq!(size_optimized.capacity(), 6000);
        assert_eq!(
            size_optimized.bucket_mode(SizeClass::XLarge),
            BucketMode::LockFree
        );
    }
}
