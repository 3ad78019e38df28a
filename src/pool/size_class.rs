//! Size-class resolution.
//!
//! Requests are rounded up to one of four fixed classes so that buffers
//! of similar size can be reused. Anything above the largest class but
//! within [`MAX_BUFFER_SIZE`] is served unpooled.

use crate::error::{Error, Result};

/// Largest size `acquire` will accept (64 MiB).
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Buffers of at least this many bytes are cache-line aligned.
pub const ALIGNMENT_THRESHOLD: usize = 4096;

/// Cache-line alignment used for medium and larger buffers.
pub const ALIGNMENT: usize = 64;

/// Fixed buffer size classes, ordered by byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeClass {
    /// 1 KiB, small messages
    Small,
    /// 4 KiB, typical network packets
    Medium,
    /// 16 KiB, large transfers
    Large,
    /// 64 KiB, bulk operations
    XLarge,
}

impl SizeClass {
    /// All classes in ascending order. Position equals [`SizeClass::index`].
    pub const ALL: [SizeClass; 4] = [
        SizeClass::Small,
        SizeClass::Medium,
        SizeClass::Large,
        SizeClass::XLarge,
    ];

    /// Number of classes (and buckets).
    pub const COUNT: usize = 4;

    /// Buffer length for this class.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            SizeClass::Small => 1024,
            SizeClass::Medium => 4096,
            SizeClass::Large => 16384,
            SizeClass::XLarge => 65536,
        }
    }

    /// Bucket index of this class.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            SizeClass::Small => 0,
            SizeClass::Medium => 1,
            SizeClass::Large => 2,
            SizeClass::XLarge => 3,
        }
    }

    /// Resolve a requested size.
    ///
    /// Returns `Ok(Some(class))` for the smallest class that fits,
    /// `Ok(None)` when the size must be served unpooled, and
    /// `Err(InvalidSize)` for 0 or anything above [`MAX_BUFFER_SIZE`].
    pub fn resolve(size: usize) -> Result<Option<SizeClass>> {
        validate_size(size)?;
        Ok(Self::ALL.into_iter().find(|class| class.bytes() >= size))
    }
}

/// Reject sizes that can never be served.
#[inline]
pub fn validate_size(size: usize) -> Result<()> {
    if size == 0 || size > MAX_BUFFER_SIZE {
        return Err(Error::InvalidSize { size });
    }
    Ok(())
}

/// Whether a buffer of `len` bytes gets cache-line alignment.
#[inline]
pub fn is_aligned_size(len: usize) -> bool {
    len >= ALIGNMENT_THRESHOLD
}
