//! Owned fixed-length byte buffers with cache-line alignment for larger sizes.

use std::alloc::{self, Layout};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use super::size_class::{is_aligned_size, ALIGNMENT};

/// Heap byte buffer handed out by the pool.
///
/// The length is fixed at allocation. Buffers of 4096 bytes or more
/// start on a 64-byte boundary.
pub struct Buffer {
    ptr: NonNull<u8>,
    len: usize,
    align: usize,
}

// SAFETY: Buffer exclusively owns its allocation, like Box<[u8]>.
unsafe impl Send for Buffer {}
// SAFETY: shared access only hands out &[u8].
unsafe impl Sync for Buffer {}

impl Buffer {
    /// Allocate a zero-filled buffer of `len` bytes.
    ///
    /// Aborts via [`alloc::handle_alloc_error`] if the allocator fails.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "buffer length must be non-zero");
        let align = if is_aligned_size(len) { ALIGNMENT } else { 1 };
        let layout = Self::layout(len, align);
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };
        Self { ptr, len, align }
    }

    fn layout(len: usize, align: usize) -> Layout {
        match Layout::from_size_align(len, align) {
            Ok(layout) => layout,
            // len is bounded by MAX_BUFFER_SIZE and align is a power of two.
            Err(_) => unreachable!("invalid buffer layout {}/{}", len, align),
        }
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; buffers are never empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment the buffer was allocated with.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.align
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len initialised bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout(self.len, self.align)) }
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("align", &self.align)
            .finish()
    }
}
