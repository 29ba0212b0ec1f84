//! Streaming PNG chunk walk.
//!
//! The walk operates over whatever window of the file has been fetched so
//! far: chunks that fit entirely inside the buffer are processed, the first
//! chunk that doesn't ends the walk without error, and the caller decides
//! whether to fetch another window and re-scan. Seeing `IEND` tells the
//! caller there is nothing left to fetch.

use crate::consts::{is_prompt_key, is_xmp_key};
use crate::scan::latin1;
use crate::{Candidate, PNG_SIGNATURE, Provenance, xmp};
use memchr::memchr;
use tracing::instrument;

/// Parsed `IHDR` fields relevant to this engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ihdr {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlace: u8,
}

impl Ihdr {
    /// Parse the 13-byte `IHDR` payload.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 13 {
            return None;
        }
        Some(Self {
            width: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            height: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            bit_depth: data[8],
            color_type: data[9],
            interlace: data[12],
        })
    }

    /// Samples per pixel for this color type, if it is one PNG defines.
    pub fn channels(&self) -> Option<usize> {
        match self.color_type {
            0 => Some(1),
            2 => Some(3),
            3 => Some(1),
            4 => Some(2),
            6 => Some(4),
            _ => None,
        }
    }
}

/// A single chunk borrowed out of the fetched window.
#[derive(Clone, Copy, Debug)]
pub struct PngChunk<'a> {
    pub ctype: [u8; 4],
    pub data: &'a [u8],
}

/// Iterator over chunks starting at offset 8.
///
/// Stops (without error) as soon as a chunk's declared span — length word,
/// type, payload and CRC — runs past the end of the buffer. CRCs are not
/// verified; a corrupt payload simply fails to decode later.
pub struct Chunks<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Chunks<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 8 }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = PngChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.buf;
        if self.offset + 8 > buf.len() {
            return None;
        }
        let length = u32::from_be_bytes([buf[self.offset], buf[self.offset + 1], buf[self.offset + 2], buf[self.offset + 3]])
            as usize;
        if self.offset + 12 + length > buf.len() {
            return None;
        }
        let ctype = [buf[self.offset + 4], buf[self.offset + 5], buf[self.offset + 6], buf[self.offset + 7]];
        let data = &buf[self.offset + 8..self.offset + 8 + length];
        self.offset += 12 + length;
        Some(PngChunk { ctype, data })
    }
}

/// Everything one pass over the fetched window produced.
#[derive(Debug, Default)]
pub struct PngScan {
    /// Text-chunk and `c2pa` candidates, in file order.
    pub candidates: Vec<Candidate>,
    /// Header, when an `IHDR` chunk was inside the window.
    pub ihdr: Option<Ihdr>,
    /// Concatenated `IDAT` payloads (still zlib-compressed).
    pub idat: Vec<u8>,
    /// Whether `IEND` was reached — nothing further to fetch.
    pub saw_iend: bool,
}

/// Walk the fetched window and collect prompt candidates.
///
/// A buffer without the PNG signature yields an empty scan.
#[instrument(skip(buf), fields(window = buf.len(), candidates, iend))]
pub fn scan(buf: &[u8]) -> PngScan {
    let mut result = PngScan::default();
    if buf.len() < 8 || buf[..8] != PNG_SIGNATURE {
        return result;
    }
    for chunk in Chunks::new(buf) {
        match &chunk.ctype {
            b"IHDR" => result.ihdr = Ihdr::parse(chunk.data),
            b"IDAT" => result.idat.extend_from_slice(chunk.data),
            b"tEXt" => text_chunk(chunk.data, &mut result.candidates),
            b"zTXt" => ztxt_chunk(chunk.data, &mut result.candidates),
            b"iTXt" => itxt_chunk(chunk.data, &mut result.candidates),
            b"c2pa" => c2pa_chunk(chunk.data, &mut result.candidates),
            b"IEND" => {
                result.saw_iend = true;
                break;
            },
            _ => {},
        }
    }
    tracing::Span::current().record("candidates", result.candidates.len());
    tracing::Span::current().record("iend", result.saw_iend);
    result
}

fn accept(keyword: &str, text: String, out: &mut Vec<Candidate>) {
    if is_xmp_key(keyword) {
        out.extend(xmp::scan(&text, Provenance::PngText));
        return;
    }
    if is_prompt_key(keyword) {
        let candidate = Candidate::new(text, Provenance::PngText);
        if !candidate.is_blank() {
            out.push(candidate);
        }
    }
}

/// `tEXt`: `keyword\0text`, both Latin-1.
fn text_chunk(data: &[u8], out: &mut Vec<Candidate>) {
    let Some(nul) = memchr(0, data) else {
        return;
    };
    let keyword = latin1(&data[..nul]);
    accept(&keyword, latin1(&data[nul + 1..]), out);
}

/// `zTXt`: `keyword\0 compressionMethod(1) compressedData`.
///
/// Only inflated when the keyword is prompt-bearing, so arbitrary chunks
/// don't cost a decompression.
fn ztxt_chunk(data: &[u8], out: &mut Vec<Candidate>) {
    let Some(nul) = memchr(0, data) else {
        return;
    };
    let keyword = latin1(&data[..nul]);
    if !is_prompt_key(&keyword) && !is_xmp_key(&keyword) {
        return;
    }
    if data.len() < nul + 2 {
        return;
    }
    // Byte after the NUL is the compression method; 0 (deflate) is the only
    // method PNG defines.
    match imprint_inflate::inflate(&data[nul + 2..]) {
        Ok(inflated) => accept(&keyword, latin1(&inflated), out),
        Err(e) => tracing::debug!(keyword, error = %e, "zTXt payload failed to inflate"),
    }
}

/// `iTXt`: `keyword\0 compressionFlag(1) compressionMethod(1) languageTag\0
/// translatedKeyword\0 text`, with UTF-8 text that may be deflate-compressed.
fn itxt_chunk(data: &[u8], out: &mut Vec<Candidate>) {
    let Some(nul) = memchr(0, data) else {
        return;
    };
    let keyword = latin1(&data[..nul]);
    if !is_prompt_key(&keyword) && !is_xmp_key(&keyword) {
        return;
    }
    let rest = &data[nul + 1..];
    if rest.len() < 2 {
        return;
    }
    let compressed = rest[0] == 1;
    let rest = &rest[2..];
    let Some(lang_end) = memchr(0, rest) else {
        return;
    };
    let rest = &rest[lang_end + 1..];
    let Some(translated_end) = memchr(0, rest) else {
        return;
    };
    let text_bytes = &rest[translated_end + 1..];
    let text = match compressed {
        false => String::from_utf8_lossy(text_bytes).into_owned(),
        true => match imprint_inflate::inflate(text_bytes) {
            Ok(inflated) => String::from_utf8_lossy(&inflated).into_owned(),
            Err(e) => {
                tracing::debug!(keyword, error = %e, "iTXt payload failed to inflate");
                return;
            },
        },
    };
    accept(&keyword, text, out);
}

/// `c2pa`: the binary manifest is not structurally parsed; both decodings of
/// the payload go to the raw scanner via the resolver.
fn c2pa_chunk(data: &[u8], out: &mut Vec<Candidate>) {
    out.extend(crate::scan::scan_window(data, Provenance::PngC2pa));
}
