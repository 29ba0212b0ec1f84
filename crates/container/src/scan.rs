//! Raw text scan over a fetched byte window.

use crate::{Candidate, Provenance};

/// Decode bytes as Latin-1 (every byte becomes the code point of the same
/// value). Cannot fail; used wherever PNG/IPTC payloads are nominally
/// Latin-1 and as the permissive decoding for raw windows.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode a byte window both as Latin-1 and as lossy UTF-8, emitting each
/// distinct non-empty decoding as a candidate with the given provenance.
///
/// The decodings themselves are noise; the prompt resolver decides whether
/// a prompt pattern is actually present (these candidates require
/// resolution, see [`Candidate::requires_resolution`]).
pub fn scan_window(bytes: &[u8], provenance: Provenance) -> Vec<Candidate> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut candidates = Vec::new();
    let as_latin1 = latin1(bytes);
    let as_utf8 = String::from_utf8_lossy(bytes).into_owned();
    let identical = as_latin1 == as_utf8;
    if !as_latin1.trim().is_empty() {
        candidates.push(Candidate::new(as_latin1, provenance));
    }
    if !identical && !as_utf8.trim().is_empty() {
        candidates.push(Candidate::new(as_utf8, provenance));
    }
    candidates
}

/// Raw scan of a fetched window (JPEG path step 3).
pub fn raw_scan(bytes: &[u8]) -> Vec<Candidate> {
    scan_window(bytes, Provenance::RawScan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_is_total() {
        let all: Vec<u8> = (0..=255).collect();
        let text = latin1(&all);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(text.chars().last(), Some('\u{FF}'));
    }

    #[test]
    fn test_ascii_window_yields_one_candidate() {
        let candidates = raw_scan(b"plain ascii text");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "plain ascii text");
        assert!(candidates[0].requires_resolution());
    }

    #[test]
    fn test_non_utf8_window_yields_both_decodings() {
        // 0xE9 is é in Latin-1 but an invalid UTF-8 sequence on its own.
        let candidates = raw_scan(b"caf\xE9");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].text, "café");
        assert_eq!(candidates[1].text, "caf\u{FFFD}");
    }

    #[test]
    fn test_empty_window() {
        assert!(raw_scan(b"").is_empty());
        assert!(raw_scan(b"   ").is_empty());
    }
}
