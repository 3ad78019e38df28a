//! Per-size-class buffer storage.
//!
//! A bucket picks one of two strategies when it is built and keeps it for
//! life:
//! - `Locked`: an arena of slots addressed by index, an explicit stack of
//!   idle slot indices and a list of vacant ones, all behind one mutex.
//! - `LockFree`: a preallocated bounded `ArrayQueue`. Each slot is claimed
//!   by the queue's per-slot stamp, so a buffer is handed to one caller
//!   only, and a full queue refuses the push instead of growing.
//!
//! Buckets never allocate or free buffer memory themselves. Misses are
//! allocated by the caller, and anything a bucket refuses or evicts is
//! handed back so it can be dropped outside any critical section.
//!
//! Every buffer entering or leaving a bucket moves the pool's
//! [`IdleGauge`] inside the same critical section.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::buffer::Buffer;
use super::size_class::SizeClass;
use super::stats::{BucketCounters, BucketStats, IdleGauge};

/// Target capacity at which a bucket uses the lock-free queue.
pub const LOCK_FREE_THRESHOLD: usize = 1000;

/// Buffers preallocated into a lock-free bucket at construction.
pub const LOCK_FREE_PREFILL: usize = 100;

/// Buffers removed from a bucket, to be dropped by the caller.
pub(crate) type Evicted = SmallVec<[Buffer; 8]>;

/// Storage strategy of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketMode {
    Locked,
    LockFree,
}

impl BucketMode {
    /// Strategy for a bucket with the given target capacity.
    #[inline]
    pub fn for_target(target: usize) -> Self {
        if target >= LOCK_FREE_THRESHOLD {
            BucketMode::LockFree
        } else {
            BucketMode::Locked
        }
    }
}

pub(crate) struct Bucket {
    class: SizeClass,
    counters: BucketCounters,
    store: Store,
}

enum Store {
    Locked(Mutex<Arena>),
    LockFree(Ring),
}

impl Bucket {
    /// Build a bucket. `ring_capacity` bounds the lock-free queue and is
    /// ignored for locked buckets. Prefilled buffers are reserved on `idle`.
    pub fn new(class: SizeClass, target: usize, ring_capacity: usize, idle: &IdleGauge) -> Self {
        let store = match BucketMode::for_target(target) {
            BucketMode::Locked => Store::Locked(Mutex::new(Arena::new(target))),
            BucketMode::LockFree => {
                Store::LockFree(Ring::new(class, target, ring_capacity.max(target), idle))
            }
        };
        Self {
            class,
            counters: BucketCounters::default(),
            store,
        }
    }

    #[inline]
    pub fn class(&self) -> SizeClass {
        self.class
    }

    pub fn mode(&self) -> BucketMode {
        match self.store {
            Store::Locked(_) => BucketMode::Locked,
            Store::LockFree(_) => BucketMode::LockFree,
        }
    }

    /// Take an idle buffer, recording a hit or a miss.
    pub fn take(&self, idle: &IdleGauge) -> Option<Buffer> {
        let buffer = match &self.store {
            Store::Locked(arena) => arena.lock().take(idle),
            Store::LockFree(ring) => ring.take(idle),
        };
        if buffer.is_some() {
            self.counters.hit();
        } else {
            self.counters.miss();
        }
        buffer
    }

    /// Store a released buffer. Hands it back when the bucket or the pool
    /// is full.
    pub fn put(&self, buffer: Buffer, idle: &IdleGauge) -> Result<(), Buffer> {
        debug_assert_eq!(buffer.len(), self.class.bytes());
        let result = match &self.store {
            Store::Locked(arena) => arena.lock().put(buffer, idle),
            Store::LockFree(ring) => ring.put(buffer, idle),
        };
        match result {
            Ok(()) => self.counters.returned(),
            Err(_) => self.counters.dropped(),
        }
        result
    }

    /// Remove idle buffers unused for at least `max_age`.
    pub fn evict_older_than(&self, max_age: Duration, idle: &IdleGauge) -> Evicted {
        let now = Instant::now();
        let evicted = match &self.store {
            Store::Locked(arena) => arena.lock().evict_older_than(now, max_age, idle),
            Store::LockFree(ring) => ring.evict_older_than(now, max_age, idle),
        };
        self.counters.evicted(evicted.len());
        evicted
    }

    /// Change the target capacity, evicting idle buffers above it.
    pub fn set_target(&self, target: usize, idle: &IdleGauge) -> Evicted {
        let evicted = match &self.store {
            Store::Locked(arena) => arena.lock().set_target(target, idle),
            Store::LockFree(ring) => ring.set_target(target, idle),
        };
        self.counters.evicted(evicted.len());
        evicted
    }

    pub fn target(&self) -> usize {
        match &self.store {
            Store::Locked(arena) => arena.lock().target,
            Store::LockFree(ring) => ring.target.load(Ordering::Relaxed),
        }
    }

    /// Largest target this bucket can accept.
    pub fn max_target(&self) -> usize {
        match &self.store {
            Store::Locked(_) => usize::MAX,
            Store::LockFree(ring) => ring.queue.capacity(),
        }
    }

    /// Idle buffers currently held.
    pub fn idle(&self) -> usize {
        match &self.store {
            Store::Locked(arena) => arena.lock().free.len(),
            Store::LockFree(ring) => ring.queue.len(),
        }
    }

    pub fn stats(&self) -> BucketStats {
        let (idle, target) = match &self.store {
            Store::Locked(arena) => {
                let arena = arena.lock();
                (arena.free.len(), arena.target)
            }
            Store::LockFree(ring) => (ring.queue.len(), ring.target.load(Ordering::Relaxed)),
        };
        self.counters.snapshot(idle, target)
    }
}

/// Lock-based bucket element.
struct Slot {
    buffer: Option<Buffer>,
    last_used: Instant,
    in_use: bool,
}

/// Index-addressed slot store. `free` holds slots with an idle buffer,
/// most recently returned last; `vacant` holds empty slots for reuse.
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    vacant: Vec<usize>,
    target: usize,
}

impl Arena {
    fn new(target: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            vacant: Vec::new(),
            target,
        }
    }

    fn take(&mut self, idle: &IdleGauge) -> Option<Buffer> {
        let idx = self.free.pop()?;
        idle.release(1);
        let slot = &mut self.slots[idx];
        slot.in_use = true;
        slot.last_used = Instant::now();
        self.vacant.push(idx);
        slot.buffer.take()
    }

    fn put(&mut self, buffer: Buffer, idle: &IdleGauge) -> Result<(), Buffer> {
        if self.free.len() >= self.target || !idle.reserve() {
            return Err(buffer);
        }
        let now = Instant::now();
        let idx = match self.vacant.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx];
                slot.buffer = Some(buffer);
                slot.last_used = now;
                slot.in_use = false;
                idx
            }
            None => {
                self.slots.push(Slot {
                    buffer: Some(buffer),
                    last_used: now,
                    in_use: false,
                });
                self.slots.len() - 1
            }
        };
        self.free.push(idx);
        Ok(())
    }

    fn evict_older_than(&mut self, now: Instant, max_age: Duration, idle: &IdleGauge) -> Evicted {
        let Arena {
            slots, free, vacant, ..
        } = self;
        let mut evicted = Evicted::new();
        free.retain(|&idx| {
            let slot = &mut slots[idx];
            if now.saturating_duration_since(slot.last_used) < max_age {
                return true;
            }
            if let Some(buffer) = slot.buffer.take() {
                evicted.push(buffer);
            }
            vacant.push(idx);
            false
        });
        idle.release(evicted.len());
        evicted
    }

    fn set_target(&mut self, target: usize, idle: &IdleGauge) -> Evicted {
        self.target = target;
        let excess = self.free.len().saturating_sub(target);
        let mut evicted = Evicted::new();
        // Oldest idle slots sit at the bottom of the stack.
        for idx in self.free.drain(..excess) {
            if let Some(buffer) = self.slots[idx].buffer.take() {
                evicted.push(buffer);
            }
            self.vacant.push(idx);
        }
        idle.release(evicted.len());
        evicted
    }
}

/// Idle buffer with the time it was returned.
struct Parked {
    buffer: Buffer,
    since: Instant,
}

/// Lock-free bucket store over a fixed-capacity queue.
///
/// Takes pop the oldest idle buffer. The gauge is reserved before a push
/// and released after a pop, so the queue's push/pop synchronisation
/// orders each release after its matching reserve.
struct Ring {
    queue: ArrayQueue<Parked>,
    target: AtomicUsize,
}

impl Ring {
    fn new(class: SizeClass, target: usize, capacity: usize, idle: &IdleGauge) -> Self {
        let ring = Self {
            queue: ArrayQueue::new(capacity.max(1)),
            target: AtomicUsize::new(target.min(capacity)),
        };
        let since = Instant::now();
        for _ in 0..LOCK_FREE_PREFILL.min(target).min(capacity) {
            if !idle.reserve() {
                break;
            }
            let parked = Parked {
                buffer: Buffer::new(class.bytes()),
                since,
            };
            if ring.queue.push(parked).is_err() {
                idle.release(1);
                break;
            }
        }
        ring
    }

    fn take(&self, idle: &IdleGauge) -> Option<Buffer> {
        let parked = self.queue.pop()?;
        idle.release(1);
        Some(parked.buffer)
    }

    fn put(&self, buffer: Buffer, idle: &IdleGauge) -> Result<(), Buffer> {
        if self.queue.len() >= self.target.load(Ordering::Relaxed) || !idle.reserve() {
            return Err(buffer);
        }
        let parked = Parked {
            buffer,
            since: Instant::now(),
        };
        self.queue.push(parked).map_err(|parked| {
            idle.release(1);
            parked.buffer
        })
    }

    /// Cycle the queue once, keeping buffers `keep` accepts.
    ///
    /// Buffers stay reserved on the gauge while popped, and one that cannot
    /// be pushed back because concurrent releases refilled the queue is
    /// evicted.
    fn evict_where(&self, idle: &IdleGauge, mut keep: impl FnMut(&Parked) -> bool) -> Evicted {
        let mut evicted = Evicted::new();
        for _ in 0..self.queue.len() {
            let Some(parked) = self.queue.pop() else {
                break;
            };
            if keep(&parked) {
                if let Err(parked) = self.queue.push(parked) {
                    evicted.push(parked.buffer);
                }
            } else {
                evicted.push(parked.buffer);
            }
        }
        idle.release(evicted.len());
        evicted
    }

    fn evict_older_than(&self, now: Instant, max_age: Duration, idle: &IdleGauge) -> Evicted {
        self.evict_where(idle, |parked| {
            now.saturating_duration_since(parked.since) < max_age
        })
    }

    fn set_target(&self, target: usize, idle: &IdleGauge) -> Evicted {
        let target = target.min(self.queue.capacity());
        self.target.store(target, Ordering::Relaxed);
        let mut evicted = Evicted::new();
        // Oldest buffers leave first.
        while self.queue.len() > target {
            match self.queue.pop() {
                Some(parked) => evicted.push(parked.buffer),
                None => break,
            }
        }
        idle.release(evicted.len());
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn buf(class: SizeClass) -> Buffer {
        Buffer::new(class.bytes())
    }

    fn gauge() -> IdleGauge {
        IdleGauge::new(usize::MAX)
    }

    #[test]
    fn test_mode_selection() {
        let idle = gauge();
        assert_eq!(BucketMode::for_target(0), BucketMode::Locked);
        assert_eq!(BucketMode::for_target(999), BucketMode::Locked);
        assert_eq!(BucketMode::for_target(1000), BucketMode::LockFree);

        assert_eq!(
            Bucket::new(SizeClass::Small, 400, 2000, &idle).mode(),
            BucketMode::Locked
        );
        assert_eq!(
            Bucket::new(SizeClass::Small, 1200, 6000, &idle).mode(),
            BucketMode::LockFree
        );
    }

    #[test]
    fn test_locked_miss_then_hit() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 4, 0, &idle);
        assert!(bucket.take(&idle).is_none());
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_ok());
        assert_eq!(bucket.idle(), 1);
        assert_eq!(idle.current(), 1);
        assert!(bucket.take(&idle).is_some());
        assert_eq!(bucket.idle(), 0);
        assert_eq!(idle.current(), 0);

        let stats = bucket.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.returns, 1);
    }

    #[test]
    fn test_locked_drops_at_capacity() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 2, 0, &idle);
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_ok());
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_ok());
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_err());
        assert_eq!(bucket.idle(), 2);
        assert_eq!(idle.current(), 2);
        assert_eq!(bucket.stats().drops, 1);
    }

    #[test]
    fn test_put_refused_at_pool_ceiling() {
        let idle = IdleGauge::new(1);
        let bucket = Bucket::new(SizeClass::Small, 8, 0, &idle);
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_ok());
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_err());
        assert_eq!(bucket.idle(), 1);
        assert_eq!(idle.current(), 1);
    }

    #[test]
    fn test_locked_slots_are_reused() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 8, 0, &idle);
        for _ in 0..3 {
            bucket.put(buf(SizeClass::Small), &idle).unwrap();
        }
        for _ in 0..3 {
            bucket.take(&idle).unwrap();
        }
        for _ in 0..3 {
            bucket.put(buf(SizeClass::Small), &idle).unwrap();
        }
        match &bucket.store {
            Store::Locked(arena) => {
                let arena = arena.lock();
                assert_eq!(arena.slots.len(), 3);
                assert!(arena.vacant.is_empty());
                assert!(arena.slots.iter().all(|s| !s.in_use && s.buffer.is_some()));
            }
            Store::LockFree(_) => unreachable!(),
        }
    }

    #[test]
    fn test_locked_evict_all() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Medium, 8, 0, &idle);
        for _ in 0..5 {
            bucket.put(buf(SizeClass::Medium), &idle).unwrap();
        }
        assert_eq!(bucket.evict_older_than(Duration::ZERO, &idle).len(), 5);
        assert_eq!(bucket.idle(), 0);
        assert_eq!(idle.current(), 0);
        assert!(bucket.take(&idle).is_none());
        assert_eq!(bucket.stats().evictions, 5);
    }

    #[test]
    fn test_locked_evict_keeps_recent() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 8, 0, &idle);
        bucket.put(buf(SizeClass::Small), &idle).unwrap();
        assert!(bucket
            .evict_older_than(Duration::from_secs(60), &idle)
            .is_empty());
        assert_eq!(bucket.idle(), 1);
        assert_eq!(idle.current(), 1);
    }

    #[test]
    fn test_locked_shrink_target() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 8, 0, &idle);
        for _ in 0..6 {
            bucket.put(buf(SizeClass::Small), &idle).unwrap();
        }
        assert_eq!(bucket.set_target(2, &idle).len(), 4);
        assert_eq!(bucket.idle(), 2);
        assert_eq!(idle.current(), 2);
        assert_eq!(bucket.target(), 2);
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_err());
    }

    #[test]
    fn test_lock_free_prefilled() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 1000, 2000, &idle);
        assert_eq!(bucket.idle(), LOCK_FREE_PREFILL);
        assert_eq!(idle.current(), LOCK_FREE_PREFILL);
        assert_eq!(bucket.max_target(), 2000);
        let b = bucket.take(&idle).unwrap();
        assert_eq!(b.len(), 1024);
        assert_eq!(bucket.idle(), LOCK_FREE_PREFILL - 1);
        assert_eq!(idle.current(), LOCK_FREE_PREFILL - 1);
        assert_eq!(bucket.stats().hits, 1);
    }

    #[test]
    fn test_lock_free_put_take() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Large, 1000, 1000, &idle);
        for _ in 0..LOCK_FREE_PREFILL {
            bucket.take(&idle).unwrap();
        }
        assert!(bucket.take(&idle).is_none());

        bucket.put(buf(SizeClass::Large), &idle).unwrap();
        assert_eq!(bucket.idle(), 1);
        assert!(bucket.take(&idle).is_some());
        assert!(bucket.take(&idle).is_none());
        assert_eq!(idle.current(), 0);
    }

    #[test]
    fn test_lock_free_full_queue_drops() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 1000, 1000, &idle);
        for _ in LOCK_FREE_PREFILL..1000 {
            bucket.put(buf(SizeClass::Small), &idle).unwrap();
        }
        assert_eq!(bucket.idle(), 1000);
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_err());
        assert_eq!(bucket.stats().drops, 1);
        assert_eq!(idle.current(), 1000);
    }

    #[test]
    fn test_lock_free_respects_target() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 1000, 1000, &idle);
        assert_eq!(bucket.set_target(LOCK_FREE_PREFILL, &idle).len(), 0);
        assert!(bucket.put(buf(SizeClass::Small), &idle).is_err());
        assert_eq!(
            bucket.set_target(10, &idle).len(),
            LOCK_FREE_PREFILL - 10
        );
        assert_eq!(bucket.idle(), 10);
        assert_eq!(idle.current(), 10);
    }

    #[test]
    fn test_lock_free_evict_all_then_miss() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 1000, 1000, &idle);
        assert_eq!(
            bucket.evict_older_than(Duration::ZERO, &idle).len(),
            LOCK_FREE_PREFILL
        );
        assert_eq!(bucket.idle(), 0);
        assert_eq!(idle.current(), 0);
        assert!(bucket.take(&idle).is_none());
    }

    #[test]
    fn test_lock_free_evict_keeps_recent() {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, 1000, 1000, &idle);
        assert!(bucket
            .evict_older_than(Duration::from_secs(60), &idle)
            .is_empty());
        assert_eq!(bucket.idle(), LOCK_FREE_PREFILL);
        assert_eq!(idle.current(), LOCK_FREE_PREFILL);
    }

    fn exclusive_handout(target: usize, capacity: usize) {
        let idle = gauge();
        let bucket = Bucket::new(SizeClass::Small, target, capacity, &idle);
        let threads = 8;
        let rounds = 500;

        std::thread::scope(|s| {
            for t in 0..threads {
                let (bucket, idle) = (&bucket, &idle);
                s.spawn(move || {
                    for i in 0..rounds {
                        let mut b = bucket
                            .take(idle)
                            .unwrap_or_else(|| buf(SizeClass::Small));
                        let token = ((t * rounds + i) as u64).to_le_bytes();
                        b[..8].copy_from_slice(&token);
                        std::thread::yield_now();
                        assert_eq!(&b[..8], &token, "buffer shared between callers");
                        let _ = bucket.put(b, idle);
                    }
                });
            }
        });

        let stats = bucket.stats();
        assert_eq!(stats.demand(), threads * rounds);
        assert!(stats.idle <= target);
        assert_eq!(idle.current(), stats.idle);

        // Every remaining idle buffer is a distinct allocation.
        let remaining = bucket.evict_older_than(Duration::ZERO, &idle);
        assert_eq!(remaining.len(), stats.idle);
        let distinct: HashSet<usize> = remaining.iter().map(|b| b.as_ptr() as usize).collect();
        assert_eq!(distinct.len(), remaining.len());
        assert_eq!(idle.current(), 0);
    }

    #[test]
    fn test_locked_exclusive_handout() {
        exclusive_handout(400, 0);
    }

    #[test]
    fn test_lock_free_exclusive_handout() {
        exclusive_handout(1000, 1000);
    }
}
