use std::fmt;

/// Unified error type for buffer pool operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Requested size is zero or exceeds the 64 MiB ceiling
    InvalidSize { size: usize },

    /// Released buffer does not belong to the size class of the given size
    SizeMismatch { expected: usize, actual: usize },

    /// Indexed access past the end of a pooled buffer
    OutOfRange { index: usize, len: usize },

    /// Access through a handle whose buffer was already released or taken
    InvalidBuffer,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSize { size } => write!(f, "Invalid buffer size: {}", size),
            Error::SizeMismatch { expected, actual } => write!(
                f,
                "Size mismatch on release: expected {} byte buffer, got {}",
                expected, actual
            ),
            Error::OutOfRange { index, len } => {
                write!(f, "Index {} out of range for buffer of {} bytes", index, len)
            }
            Error::InvalidBuffer => write!(f, "Accessing invalid buffer"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias for buffer pool operations
pub type Result<T> = std::result::Result<T, Error>;
