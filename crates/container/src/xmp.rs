//! Prompt scanning of XMP packet text.
//!
//! XMP arrives from two directions — JPEG APP1 segments and PNG text chunks
//! keyed `XML:com.adobe.xmp` — and both funnel through [`scan`]. The packet
//! is treated as text, not parsed as XML: the attribute/element patterns in
//! `consts` pull prompt-bearing fields straight out, and the whole packet is
//! additionally emitted as a raw-scan candidate so the resolver can find
//! JSON embedded anywhere inside it.

use crate::consts::{RE_XMP_ATTR, RE_XMP_DESC, RE_XMP_TAG, XML_ENTITIES};
use crate::{Candidate, Provenance};

fn unescape_xml(text: &str) -> String {
    let mut out = text.to_string();
    for (entity, replacement) in XML_ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

/// Scan XMP packet text for prompt-bearing fields.
///
/// Candidates are emitted in pattern order (attributes, element text,
/// `dc:description` alt items) followed by one raw-scan candidate holding
/// the entire packet for embedded-JSON resolution.
pub fn scan(text: &str, provenance: Provenance) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for captures in RE_XMP_ATTR.captures_iter(text) {
        if let Some(value) = captures.get(1) {
            candidates.push(Candidate::new(unescape_xml(value.as_str().trim()), provenance));
        }
    }
    for captures in RE_XMP_TAG.captures_iter(text) {
        if let Some(value) = captures.get(1) {
            candidates.push(Candidate::new(unescape_xml(value.as_str().trim()), provenance));
        }
    }
    if let Some(captures) = RE_XMP_DESC.captures(text)
        && let Some(value) = captures.get(1)
    {
        candidates.push(Candidate::new(unescape_xml(value.as_str().trim()), provenance));
    }
    candidates.retain(|c| !c.is_blank());
    // The resolver may still find embedded JSON the field patterns missed.
    candidates.push(Candidate::new(text, Provenance::RawScan));
    candidates
}
