//! Byte sources and the fetch concurrency gate.
//!
//! This crate defines the [`ByteSource`] trait: a minimal, range-oriented
//! read interface over an image that may only be partially fetchable (a
//! remote URL behind HTTP range requests, a local file, an opaque content
//! handle). Sources perform *one* bounded read per call and carry no retry
//! or backoff logic of their own — callers bound their attempts.
//!
//! Network-facing callers wrap every source call in a [`FetchGate`] permit so
//! that no more than a user-configured number of range requests (at most
//! three) are in flight at once.

pub mod error;
mod file;
mod gate;
#[cfg(feature = "mock")]
mod mock;

pub use crate::file::FileSource;
pub use crate::gate::{FetchGate, MAX_PERMITS};
#[cfg(feature = "mock")]
pub use crate::mock::MockSource;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Hard ceiling on a single range request, regardless of what the caller
/// asks for or the source claims to hold.
pub const MAX_RANGE_BYTES: u64 = 2 * 1024 * 1024;

/// A shareable, dynamically-dispatched byte source.
pub type SourceHandle = Arc<dyn ByteSource + Send + Sync>;

/// A requested byte range, before clamping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteWindow {
    /// Start offset into the source.
    pub offset: u64,
    /// Number of bytes requested.
    pub length: u64,
}

impl ByteWindow {
    /// Build a window and clamp its length to [`MAX_RANGE_BYTES`].
    pub fn clamped(offset: u64, length: u64) -> Self {
        Self { offset, length: length.min(MAX_RANGE_BYTES) }
    }
}

/// Minimal interface for bounded, range-limited reads.
///
/// Implementations may return fewer bytes than requested when the range runs
/// past the end of the source; an empty return means there is nothing at or
/// beyond `offset`. A length probe is a *hint* — sources that cannot cheaply
/// determine their size return `Ok(None)` and callers proceed without it.
///
/// # Examples
///
/// ```no_run
/// use imprint_fetch::{ByteWindow, SourceHandle};
///
/// async fn sniff(source: &SourceHandle) -> Option<Vec<u8>> {
///     let window = ByteWindow::clamped(0, 8);
///     source.fetch_range(window.offset, window.length).await.ok()
/// }
/// ```
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Name of the source (used for logging only).
    fn name(&self) -> &str;

    /// Probe the total length of the source, if cheaply knowable.
    async fn head_length(&self) -> Result<Option<u64>>;

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// The effective length is clamped to [`MAX_RANGE_BYTES`]. Reads past
    /// the end of the source truncate; a read entirely past the end returns
    /// an empty buffer rather than an error.
    async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>>;
}
