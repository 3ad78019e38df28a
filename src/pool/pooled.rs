//! RAII handle over a pooled buffer.

use std::fmt;
use std::ops::{Index, IndexMut};

use tracing::warn;

use crate::error::{Error, Result};

use super::buffer::Buffer;
use super::global::global_pool;
use super::memory_pool::MemoryPool;
use super::size_class::SizeClass;

/// A pool a [`PooledBuffer`] can draw from and return to.
pub trait BufferSource {
    fn acquire(&self, size: usize) -> Result<Buffer>;

    fn release(&self, buffer: Buffer, size: usize) -> Result<()>;
}

impl BufferSource for MemoryPool {
    fn acquire(&self, size: usize) -> Result<Buffer> {
        MemoryPool::acquire(self, size)
    }

    fn release(&self, buffer: Buffer, size: usize) -> Result<()> {
        MemoryPool::release(self, buffer, size)
    }
}

/// Buffer that returns itself to its pool when dropped.
///
/// The handle exposes exactly the requested number of bytes, even though
/// the underlying buffer is rounded up to its size class. The buffer is
/// released once: on drop, on [`release`](Self::release), or never if it
/// is moved out with [`take`](Self::take).
pub struct PooledBuffer<'a, P: BufferSource + ?Sized = MemoryPool> {
    buf: Option<Buffer>,
    size: usize,
    pool: &'a P,
}

impl PooledBuffer<'static> {
    /// Acquire `size` bytes from the global pool.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_pool(global_pool(), size)
    }

    /// Acquire a whole size class from the global pool.
    pub fn from_class(class: SizeClass) -> Self {
        Self::with_pool_class(global_pool(), class)
    }
}

impl<'a> PooledBuffer<'a> {
    /// Acquire a whole size class from `pool`.
    pub fn with_pool_class(pool: &'a MemoryPool, class: SizeClass) -> Self {
        Self {
            buf: Some(pool.acquire_class(class)),
            size: class.bytes(),
            pool,
        }
    }
}

impl<'a, P: BufferSource + ?Sized> PooledBuffer<'a, P> {
    /// Acquire `size` bytes from `pool`.
    pub fn with_pool(pool: &'a P, size: usize) -> Result<Self> {
        let buf = pool.acquire(size)?;
        Ok(Self {
            buf: Some(buf),
            size,
            pool,
        })
    }

    /// Requested size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the handle still holds its buffer.
    #[inline]
    pub fn valid(&self) -> bool {
        self.buf.is_some()
    }

    /// The requested bytes, or an empty slice once released.
    pub fn as_slice(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => &buf[..self.size],
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => &mut buf[..self.size],
            None => &mut [],
        }
    }

    /// Raw pointer to the first byte. Null once released.
    pub fn as_ptr(&self) -> *const u8 {
        self.buf.as_ref().map_or(std::ptr::null(), |buf| buf.as_ptr())
    }

    /// Mutable raw pointer to the first byte. Null once released.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.buf
            .as_mut()
            .map_or(std::ptr::null_mut(), |buf| buf.as_mut_ptr())
    }

    /// Bounds-checked access.
    pub fn at(&self, index: usize) -> Result<&u8> {
        self.check_bounds(index)?;
        Ok(&self.as_slice()[index])
    }

    /// Bounds-checked mutable access.
    pub fn at_mut(&mut self, index: usize) -> Result<&mut u8> {
        self.check_bounds(index)?;
        Ok(&mut self.as_mut_slice()[index])
    }

    fn check_bounds(&self, index: usize) -> Result<()> {
        if !self.valid() {
            return Err(Error::InvalidBuffer);
        }
        if index >= self.size {
            return Err(Error::OutOfRange {
                index,
                len: self.size,
            });
        }
        Ok(())
    }

    /// Return the buffer to the pool now.
    pub fn release(mut self) -> Result<()> {
        match self.buf.take() {
            Some(buf) => self.pool.release(buf, self.size),
            None => Ok(()),
        }
    }

    /// Take the buffer, preventing return to pool.
    pub fn take(mut self) -> Option<Buffer> {
        self.buf.take()
    }
}

impl<P: BufferSource + ?Sized> Index<usize> for PooledBuffer<'_, P> {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        match self.at(index) {
            Ok(byte) => byte,
            Err(e) => panic!("{}", e),
        }
    }
}

impl<P: BufferSource + ?Sized> IndexMut<usize> for PooledBuffer<'_, P> {
    fn index_mut(&mut self, index: usize) -> &mut u8 {
        if let Err(e) = self.check_bounds(index) {
            panic!("{}", e);
        }
        &mut self.as_mut_slice()[index]
    }
}

impl<P: BufferSource + ?Sized> Drop for PooledBuffer<'_, P> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            if let Err(e) = self.pool.release(buf, self.size) {
                warn!("Failed to return pooled buffer: {}", e);
            }
        }
    }
}

impl<P: BufferSource + ?Sized> fmt::Debug for PooledBuffer<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("size", &self.size)
            .field("valid", &self.valid())
            .finish()
    }
}
