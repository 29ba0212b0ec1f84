//! In-memory byte source for testing.

use crate::error::{ErrorKind, Result};
use crate::{ByteSource, MAX_RANGE_BYTES};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory byte source for testing.
///
/// Holds a byte buffer and counts every trait call, so tests can assert that
/// a cache hit or a disabled feature gate performed *zero* fetches, or that
/// an incremental walk issued the expected number of range reads.
///
/// # Examples
///
/// ```
/// use imprint_fetch::{ByteSource, MockSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let source = MockSource::new(b"\x89PNG\r\n\x1a\n....".to_vec());
/// let head = source.fetch_range(0, 8).await.unwrap();
/// assert_eq!(&head, b"\x89PNG\r\n\x1a\n");
/// assert_eq!(source.range_calls(), 1);
/// # }
/// ```
pub struct MockSource {
    name: String,
    bytes: Vec<u8>,
    hide_length: bool,
    fail_ranges: AtomicBool,
    head_calls: AtomicUsize,
    range_calls: AtomicUsize,
}

impl MockSource {
    /// Create a mock source over `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            name: "mock".to_string(),
            bytes,
            hide_length: false,
            fail_ranges: AtomicBool::new(false),
            head_calls: AtomicUsize::new(0),
            range_calls: AtomicUsize::new(0),
        }
    }

    /// Make `head_length` report `None`, as a source without a usable
    /// length probe would.
    pub fn without_length(mut self) -> Self {
        self.hide_length = true;
        self
    }

    /// Make every subsequent `fetch_range` fail with an I/O error.
    pub fn fail_from_now_on(&self) {
        self.fail_ranges.store(true, Ordering::SeqCst);
    }

    /// Number of `head_length` calls observed.
    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_range` calls observed.
    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn head_length(&self) -> Result<Option<u64>> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.hide_length {
            true => None,
            false => Some(self.bytes.len() as u64),
        })
    }

    async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ranges.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Io(std::io::Error::other("injected failure")));
        }
        let length = length.min(MAX_RANGE_BYTES);
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start >= self.bytes.len() {
            return Ok(Vec::new());
        }
        let end = start.saturating_add(usize::try_from(length).unwrap_or(usize::MAX)).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }
}
