//! Image container readers.
//!
//! Everything in this crate is best-effort by design: the input is an
//! arbitrary, possibly truncated byte window fetched over the network, and
//! the public contract of the engine is "a prompt string or nothing". Walks
//! stop quietly at the first malformed structure, keeping whatever
//! candidates were accumulated up to that point; a payload that fails to
//! decode is skipped without aborting its siblings.

mod consts;
pub mod exif;
pub mod jpeg;
pub mod png;
pub mod scan;
pub mod xmp;

/// The PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Coarse container classification of a byte buffer.
///
/// Extension hints pick the initial *fetch strategy*, but this sniff always
/// decides the final parse choice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    /// The buffer starts with the 8-byte PNG signature.
    Png,
    /// Anything else; treated as JPEG/EXIF-capable.
    Other,
}

impl Format {
    /// Classify a buffer. Fewer than 8 bytes classifies as [`Other`](Self::Other).
    pub fn sniff(buf: &[u8]) -> Self {
        match buf.len() >= 8 && buf[..8] == PNG_SIGNATURE {
            true => Self::Png,
            false => Self::Other,
        }
    }
}

/// Where a candidate payload was recovered from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Provenance {
    /// EXIF tag (`UserComment`, `ImageDescription`, `XPComment`).
    Exif,
    /// JPEG APP1 XMP packet.
    JpegXmp,
    /// JPEG APP13 Photoshop/IPTC-IIM resource.
    JpegIptc,
    /// PNG `tEXt`/`zTXt`/`iTXt` chunk.
    PngText,
    /// PNG `c2pa` chunk payload.
    PngC2pa,
    /// Alpha-channel least-significant-bit payload.
    AlphaStego,
    /// Raw text scan over a fetched window.
    RawScan,
}

/// A candidate text payload recovered from a container, pending resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Candidate {
    /// Decoded payload text.
    pub text: String,
    /// Which reader produced it.
    pub provenance: Provenance,
}

impl Candidate {
    pub fn new(text: impl Into<String>, provenance: Provenance) -> Self {
        Self { text: text.into(), provenance }
    }

    /// A blank candidate is never accepted: empty after trimming, or the
    /// literal `"UNICODE"` marker an undecoded EXIF encoding tag leaves
    /// behind.
    pub fn is_blank(&self) -> bool {
        let trimmed = self.text.trim();
        trimmed.is_empty() || trimmed == "UNICODE"
    }

    /// Whether this candidate is only meaningful after the prompt resolver
    /// finds something inside it. Raw window decodes and unparsed `c2pa`
    /// payloads are noise unless a prompt pattern matches; everything else
    /// is already extracted text and may be returned verbatim.
    pub fn requires_resolution(&self) -> bool {
        matches!(self.provenance, Provenance::RawScan | Provenance::PngC2pa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], Format::Png)]
    #[case(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3], Format::Png)]
    #[case(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0], Format::Other)]
    #[case(b"GIF89a..", Format::Other)]
    #[case(&[0x89, b'P', b'N', b'G'], Format::Other)]
    #[case(&[], Format::Other)]
    fn test_sniff(#[case] buf: &[u8], #[case] expected: Format) {
        assert_eq!(Format::sniff(buf), expected);
    }

    #[rstest]
    #[case("", true)]
    #[case("   \n", true)]
    #[case("UNICODE", true)]
    #[case("  UNICODE  ", true)]
    #[case("UNICORN", false)]
    #[case("a prompt", false)]
    fn test_blank_candidates(#[case] text: &str, #[case] blank: bool) {
        assert_eq!(Candidate::new(text, Provenance::Exif).is_blank(), blank);
    }
}
