//! Alpha-channel LSB steganography decoder.
//!
//! Some image generators embed their generation settings as a JSON blob in
//! the least-significant bit of each pixel's alpha value. The embedding
//! tool's bit order varies, so both packings are tried: bits read in pixel
//! order filling output bytes least-significant-bit first, and the same
//! bits filling most-significant-bit first. A hit in either stream
//! short-circuits the other.

pub mod error;
pub mod unfilter;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use imprint_container::png::Ihdr;
use regex::Regex;
use std::sync::LazyLock;
use tracing::instrument;

/// The embedder this decoder recognizes, matched inside candidate JSON.
static RE_SOFTWARE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"software"\s*:\s*"novelai""#)
        .unwrap_or_else(|err| panic!("hardcoded regex must compile: {err}"))
});

/// Decode a steganographic payload from a PNG's compressed pixel data.
///
/// Preconditions on the header: no interlacing, 8-bit samples, and an alpha
/// channel (color type 4 or 6). Any other image yields `Ok(None)` since the
/// embedding scheme is undefined for it. Errors surface genuine corruption
/// in images that met the preconditions.
#[instrument(skip(ihdr, idat), fields(width = ihdr.width, height = ihdr.height, idat = idat.len()))]
pub fn decode(ihdr: &Ihdr, idat: &[u8]) -> Result<Option<String>> {
    if ihdr.interlace != 0 || ihdr.bit_depth != 8 || !matches!(ihdr.color_type, 4 | 6) {
        return Ok(None);
    }
    let Some(channels) = ihdr.channels() else {
        return Ok(None);
    };
    let raw = imprint_inflate::inflate_capped(idat, imprint_inflate::MAX_PIXEL_BYTES)
        .or_raise(|| ErrorKind::Inflate)?;
    let pixels =
        unfilter::unfilter(&raw, ihdr.width as usize, ihdr.height as usize, channels)?;

    // Alpha is the last sample of each pixel.
    let bits: Vec<u8> =
        pixels.chunks_exact(channels).map(|px| px[channels - 1] & 1).collect();
    for stream in [pack_bits(&bits, BitOrder::LsbFirst), pack_bits(&bits, BitOrder::MsbFirst)] {
        let text = String::from_utf8_lossy(&stream);
        if let Some(payload) = find_marked_json(&text) {
            return Ok(Some(payload.to_string()));
        }
    }
    Ok(None)
}

#[derive(Clone, Copy)]
enum BitOrder {
    /// First bit read becomes bit 0 of the output byte.
    LsbFirst,
    /// First bit read becomes bit 7 of the output byte.
    MsbFirst,
}

fn pack_bits(bits: &[u8], order: BitOrder) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|octet| {
            octet.iter().enumerate().fold(0u8, |byte, (i, &bit)| match order {
                BitOrder::LsbFirst => byte | (bit << i),
                BitOrder::MsbFirst => byte | (bit << (7 - i)),
            })
        })
        .collect()
}

/// Find the first brace-balanced `{...}` substring containing the software
/// marker. Balance counting is byte-level, not a JSON parse; good enough
/// for payloads written by the embedders this targets.
fn find_marked_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    for hit in RE_SOFTWARE_MARKER.find_iter(text) {
        // Try enclosing objects from the innermost outward.
        for start in (0..=hit.start()).rev().filter(|&i| bytes[i] == b'{') {
            let mut depth = 0usize;
            for i in start..bytes.len() {
                match bytes[i] {
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            if i >= hit.end() {
                                return text.get(start..=i);
                            }
                            break;
                        }
                    },
                    _ => {},
                }
            }
        }
    }
    None
}
