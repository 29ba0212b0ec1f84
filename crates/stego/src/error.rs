//! Steganography Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A steganography decode error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for steganography operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A scanline declared a filter type PNG does not define. The pixel
    /// data is corrupt; don't retry with the same input.
    #[display("unknown scanline filter type {_0}")]
    UnknownFilter(#[error(not(source))] u8),
    /// Inflated pixel data doesn't match the dimensions the header
    /// declared, so scanline reconstruction is impossible.
    #[display("pixel data is {actual} bytes, header implies {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    /// The compressed pixel stream failed to inflate.
    #[display("pixel data failed to decompress")]
    Inflate,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
