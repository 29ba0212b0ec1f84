//! Bounded zlib inflate/deflate.
//!
//! PNG embeds zlib (RFC 1950) streams in two places this workspace cares
//! about: compressed `zTXt`/`iTXt` text payloads and the `IDAT` pixel data
//! consumed by the steganography decoder. Both arrive from untrusted inputs,
//! so every inflate is capped: a crafted stream stops at the cap instead of
//! ballooning in memory.
//!
//! The forward direction ([`deflate`]) exists for callers constructing
//! compressed chunks (fixtures, round-trip tests).

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};
use tracing::instrument;

/// Default cap applied to text-chunk payloads.
pub const MAX_TEXT_BYTES: usize = 1024 * 1024;
/// Cap applied to reconstructed `IDAT` pixel data.
pub const MAX_PIXEL_BYTES: usize = 10 * 1024 * 1024;

/// Inflate a zlib stream with the default text-payload cap.
///
/// # Examples
///
/// ```
/// let original = b"parameters: a scenic vista";
/// let packed = imprint_inflate::deflate(original).unwrap();
/// let unpacked = imprint_inflate::inflate(&packed).unwrap();
/// assert_eq!(unpacked, original);
/// ```
pub fn inflate(input: &[u8]) -> Result<Vec<u8>> {
    inflate_capped(input, MAX_TEXT_BYTES)
}

/// Inflate a zlib stream, erroring once decompressed output exceeds `cap`.
///
/// The decoder reads through [`Read::take`], so a decompression bomb is cut
/// off at `cap + 1` bytes of output rather than exhausting memory.
#[instrument(skip(input), fields(input_size = input.len(), output_size))]
pub fn inflate_capped(input: &[u8], cap: usize) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let decoder = ZlibDecoder::new(input);
    // Read one byte past the cap so overflow is distinguishable from an
    // output of exactly `cap` bytes.
    let limit = u64::try_from(cap).unwrap_or(u64::MAX).saturating_add(1);
    decoder.take(limit).read_to_end(&mut output).or_raise(|| ErrorKind::InvalidData)?;
    if output.len() > cap {
        exn::bail!(ErrorKind::TooLarge(cap));
    }
    tracing::Span::current().record("output_size", output.len());
    Ok(output)
}

/// Compress a byte slice into a zlib stream.
#[instrument(skip(input), fields(input_size = input.len(), output_size))]
pub fn deflate(input: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
    let output = encoder.finish().or_raise(|| ErrorKind::Io)?;
    tracing::Span::current().record("output_size", output.len());
    Ok(output)
}
