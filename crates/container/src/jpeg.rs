//! JPEG marker-segment walker.
//!
//! Walks APPn segments from just past the SOI marker, routing APP1 payloads
//! to the EXIF and XMP readers and APP13 payloads to the Photoshop/IPTC
//! reader. Stops at SOS, since nothing after entropy-coded data interests
//! us, and at the first structurally impossible segment.

use crate::{exif, xmp, Candidate, Provenance};

const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const MARKER_APP1: u8 = 0xE1;
const MARKER_APP13: u8 = 0xED;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const XMP_PREFIX: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const PHOTOSHOP_PREFIX: &[u8] = b"Photoshop 3.0\0";

/// Photoshop image resource id for the IPTC-IIM block.
const RESOURCE_IPTC: u16 = 0x0404;

/// Record 2 datasets worth surfacing as candidates, in preference order:
/// caption/abstract, headline, copyright notice, caption writer.
const IPTC_DATASETS: [u8; 4] = [120, 105, 116, 122];

/// Walk the marker segments of a JPEG buffer and collect every caption-like
/// candidate from its APP1 (EXIF, XMP) and APP13 (IPTC) segments.
pub fn scan(buf: &[u8]) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut pos = 2usize;
    while pos + 4 <= buf.len() {
        if buf[pos] != 0xFF {
            break;
        }
        let marker = buf[pos + 1];
        // Fill bytes and standalone markers carry no length field.
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        if marker == MARKER_SOS || marker == MARKER_EOI {
            break;
        }
        let length = u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]) as usize;
        if length < 2 {
            break;
        }
        let Some(payload) = buf.get(pos + 4..pos + 2 + length) else {
            break;
        };
        match marker {
            MARKER_APP1 => scan_app1(payload, &mut candidates),
            MARKER_APP13 => scan_app13(payload, &mut candidates),
            _ => {},
        }
        pos += 2 + length;
    }
    candidates
}

fn scan_app1(payload: &[u8], candidates: &mut Vec<Candidate>) {
    if payload.starts_with(EXIF_PREFIX) {
        if let Some(candidate) = exif::extract(payload) {
            candidates.push(candidate);
        }
    } else if let Some(packet) = payload.strip_prefix(XMP_PREFIX) {
        let text = String::from_utf8_lossy(packet);
        candidates.extend(xmp::scan(&text, Provenance::JpegXmp));
    }
}

/// Walk the `8BIM` image resource blocks of an APP13 Photoshop payload.
fn scan_app13(payload: &[u8], candidates: &mut Vec<Candidate>) {
    let Some(mut rest) = payload.strip_prefix(PHOTOSHOP_PREFIX) else {
        return;
    };
    while rest.len() >= 12 {
        if &rest[..4] != b"8BIM" {
            return;
        }
        let id = u16::from_be_bytes([rest[4], rest[5]]);
        // Pascal name, padded so the name field occupies an even byte count.
        let name_len = rest[6] as usize;
        let name_field = (1 + name_len + 1) & !1;
        let Some(after_name) = rest.get(6 + name_field..) else {
            return;
        };
        if after_name.len() < 4 {
            return;
        }
        let size = u32::from_be_bytes([after_name[0], after_name[1], after_name[2], after_name[3]])
            as usize;
        let Some(data) = after_name.get(4..4 + size) else {
            return;
        };
        if id == RESOURCE_IPTC {
            scan_iptc(data, candidates);
        }
        let data_field = (size + 1) & !1;
        let Some(next) = after_name.get(4 + data_field..) else {
            return;
        };
        rest = next;
    }
}

/// Walk IPTC-IIM datasets and surface the record 2 text fields we care
/// about, in [`IPTC_DATASETS`] preference order.
fn scan_iptc(data: &[u8], candidates: &mut Vec<Candidate>) {
    let mut found: Vec<(u8, String)> = Vec::new();
    let mut pos = 0usize;
    while pos + 5 <= data.len() {
        if data[pos] != 0x1C {
            break;
        }
        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        let Some(value) = data.get(pos + 5..pos + 5 + length) else {
            break;
        };
        if record == 2 && IPTC_DATASETS.contains(&dataset) {
            found.push((dataset, String::from_utf8_lossy(value).into_owned()));
        }
        pos += 5 + length;
    }
    found.sort_by_key(|(dataset, _)| {
        IPTC_DATASETS.iter().position(|d| d == dataset).unwrap_or(usize::MAX)
    });
    candidates.extend(
        found.into_iter().map(|(_, text)| Candidate::new(text, Provenance::JpegIptc)),
    );
}
