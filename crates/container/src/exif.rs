//! Minimal TIFF/EXIF tag reader.
//!
//! Only the three caption-bearing tags this engine cares about are read:
//! `UserComment` (Exif sub-IFD), `ImageDescription` and `XPComment` (IFD0).
//! Operates on slices, never allocates for the walk itself, and treats any
//! out-of-range offset or truncated IFD as the quiet end of the walk.

use crate::{Candidate, Provenance};
use memchr::memmem;

/// ImageDescription (ASCII).
const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
/// Pointer to the Exif sub-IFD.
const TAG_EXIF_IFD: u16 = 0x8769;
/// UserComment (UNDEFINED, 8-byte encoding prefix).
const TAG_USER_COMMENT: u16 = 0x9286;
/// Windows XPComment (BYTE array holding UTF-16LE).
const TAG_XP_COMMENT: u16 = 0x9C9C;

/// TIFF magic number.
const TIFF_MAGIC: u16 = 0x002A;
/// Size of one IFD entry in bytes.
const IFD_ENTRY_LEN: usize = 12;
/// Upper bound on entries read from a single IFD; a count beyond this is
/// treated as corruption.
const MAX_IFD_ENTRIES: usize = 512;

#[derive(Debug, Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    #[inline]
    fn read_u16(self, data: &[u8], offset: usize) -> Option<u16> {
        let bytes = data.get(offset..offset + 2)?;
        Some(match self {
            Endian::Little => u16::from_le_bytes([bytes[0], bytes[1]]),
            Endian::Big => u16::from_be_bytes([bytes[0], bytes[1]]),
        })
    }

    #[inline]
    fn read_u32(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes = data.get(offset..offset + 4)?;
        Some(match self {
            Endian::Little => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Endian::Big => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }
}

/// Check the TIFF header and return (endianness, IFD0 offset).
fn read_header(data: &[u8]) -> Option<(Endian, u32)> {
    if data.len() < 8 {
        return None;
    }
    let endian = match (data[0], data[1]) {
        (0x49, 0x49) => Endian::Little,
        (0x4D, 0x4D) => Endian::Big,
        _ => return None,
    };
    if endian.read_u16(data, 2)? != TIFF_MAGIC {
        return None;
    }
    let ifd0 = endian.read_u32(data, 4)?;
    Some((endian, ifd0))
}

/// Size in bytes of one value for a TIFF field type (the types our tags use).
fn type_unit_size(field_type: u16) -> Option<usize> {
    match field_type {
        1 | 2 | 7 => Some(1), // BYTE, ASCII, UNDEFINED
        3 => Some(2),         // SHORT
        4 => Some(4),         // LONG
        _ => None,
    }
}

/// Resolve the value bytes of an IFD entry at `entry` (values of four bytes
/// or fewer are inline, larger ones live at an absolute offset).
fn entry_value<'a>(tiff: &'a [u8], entry: usize, endian: Endian) -> Option<(u16, &'a [u8])> {
    let tag = endian.read_u16(tiff, entry)?;
    let field_type = endian.read_u16(tiff, entry + 2)?;
    let count = endian.read_u32(tiff, entry + 4)? as usize;
    let size = type_unit_size(field_type)?.checked_mul(count)?;
    let value = if size <= 4 {
        tiff.get(entry + 8..entry + 8 + size)?
    } else {
        let offset = endian.read_u32(tiff, entry + 8)? as usize;
        tiff.get(offset..offset.checked_add(size)?)?
    };
    Some((tag, value))
}

/// Walk one IFD, calling `visit` per resolvable entry.
fn walk_ifd<'a>(tiff: &'a [u8], offset: usize, endian: Endian, visit: &mut impl FnMut(u16, &'a [u8])) {
    let Some(count) = endian.read_u16(tiff, offset) else {
        return;
    };
    let count = (count as usize).min(MAX_IFD_ENTRIES);
    for i in 0..count {
        let entry = offset + 2 + i * IFD_ENTRY_LEN;
        if entry + IFD_ENTRY_LEN > tiff.len() {
            return;
        }
        if let Some((tag, value)) = entry_value(tiff, entry, endian) {
            visit(tag, value);
        }
    }
}

/// Locate the TIFF body: raw `II*`/`MM*` data, or the bytes after an
/// `Exif\0\0` marker anywhere in the buffer (JPEG APP1, WebP EXIF chunk).
fn find_tiff(buf: &[u8]) -> Option<&[u8]> {
    if read_header(buf).is_some() {
        return Some(buf);
    }
    let at = memmem::find(buf, b"Exif\0\0")?;
    let tiff = &buf[at + 6..];
    read_header(tiff).is_some().then_some(tiff)
}

fn trim_nuls(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &bytes[..end]
}

/// Decode a `UserComment` value by its 8-byte encoding prefix.
fn decode_user_comment(value: &[u8]) -> String {
    if value.len() < 8 {
        return String::from_utf8_lossy(trim_nuls(value)).into_owned();
    }
    let (prefix, tail) = value.split_at(8);
    match prefix {
        b"UNICODE\0" => decode_utf16_bytes(tail),
        b"ASCII\0\0\0" => String::from_utf8_lossy(trim_nuls(tail)).into_owned(),
        // No Shift-JIS table in this stack; surface the tail as-is rather
        // than dropping the candidate entirely.
        b"JIS\0\0\0\0\0" => String::from_utf8_lossy(trim_nuls(tail)).into_owned(),
        [0, 0, 0, 0, 0, 0, 0, 0] => String::from_utf8_lossy(trim_nuls(tail)).into_owned(),
        _ => String::from_utf8_lossy(trim_nuls(value)).into_owned(),
    }
}

/// UTF-16 with optional BOM, defaulting to little-endian (the byte order
/// every known writer of this tag uses).
fn decode_utf16_bytes(bytes: &[u8]) -> String {
    let (bytes, big_endian) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        _ => (bytes, false),
    };
    let units = bytes.chunks_exact(2).map(|pair| match big_endian {
        true => u16::from_be_bytes([pair[0], pair[1]]),
        false => u16::from_le_bytes([pair[0], pair[1]]),
    });
    let text: String =
        char::decode_utf16(units).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)).collect();
    text.trim_end_matches('\0').to_string()
}

/// Extract the best caption-like EXIF value from a buffer that may contain
/// TIFF data (raw, or embedded behind a JPEG/WebP `Exif\0\0` marker).
///
/// Preference order: `UserComment`, then `ImageDescription`, then
/// `XPComment`. Returns `None` when no tag yields non-blank text.
pub fn extract(buf: &[u8]) -> Option<Candidate> {
    let tiff = find_tiff(buf)?;
    let (endian, ifd0) = read_header(tiff)?;

    let mut user_comment: Option<String> = None;
    let mut description: Option<String> = None;
    let mut xp_comment: Option<String> = None;
    let mut exif_ifd: Option<u32> = None;

    walk_ifd(tiff, ifd0 as usize, endian, &mut |tag, value| match tag {
        TAG_USER_COMMENT => user_comment = Some(decode_user_comment(value)),
        TAG_IMAGE_DESCRIPTION => description = Some(String::from_utf8_lossy(trim_nuls(value)).into_owned()),
        TAG_XP_COMMENT => xp_comment = Some(decode_utf16_bytes(value)),
        TAG_EXIF_IFD if value.len() == 4 => {
            exif_ifd = Some(match endian {
                Endian::Little => u32::from_le_bytes([value[0], value[1], value[2], value[3]]),
                Endian::Big => u32::from_be_bytes([value[0], value[1], value[2], value[3]]),
            });
        },
        _ => {},
    });
    if let Some(sub) = exif_ifd {
        walk_ifd(tiff, sub as usize, endian, &mut |tag, value| {
            if tag == TAG_USER_COMMENT {
                user_comment = Some(decode_user_comment(value));
            }
        });
    }

    [user_comment, description, xp_comment]
        .into_iter()
        .flatten()
        .map(|text| Candidate::new(text, Provenance::Exif))
        .find(|c| !c.is_blank())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a little-endian TIFF with one IFD0 entry pointing at `value`
    /// stored out-of-line, plus an optional Exif sub-IFD entry.
    fn tiff_with(tag: u16, field_type: u16, value: &[u8], via_sub_ifd: bool) -> Vec<u8> {
        let mut out = vec![0x49, 0x49, 0x2A, 0x00, 8, 0, 0, 0];
        let entry_count: u16 = 1;
        let ifd_len = 2 + IFD_ENTRY_LEN + 4;
        if via_sub_ifd {
            // IFD0 holds only the sub-IFD pointer; the real entry lives there.
            let sub_offset = 8 + ifd_len;
            let value_offset = sub_offset + ifd_len;
            out.extend_from_slice(&entry_count.to_le_bytes());
            out.extend_from_slice(&TAG_EXIF_IFD.to_le_bytes());
            out.extend_from_slice(&4u16.to_le_bytes());
            out.extend_from_slice(&1u32.to_le_bytes());
            out.extend_from_slice(&(sub_offset as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&entry_count.to_le_bytes());
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field_type.to_le_bytes());
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(&(value_offset as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
        } else {
            let value_offset = 8 + ifd_len;
            out.extend_from_slice(&entry_count.to_le_bytes());
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field_type.to_le_bytes());
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(&(value_offset as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
        }
        out.extend_from_slice(value);
        out
    }

    #[test]
    fn test_user_comment_ascii() {
        let mut value = b"ASCII\0\0\0".to_vec();
        value.extend_from_slice(b"sunlit meadow\0");
        let tiff = tiff_with(TAG_USER_COMMENT, 7, &value, true);
        assert_eq!(extract(&tiff).unwrap().text, "sunlit meadow");
    }

    #[test]
    fn test_user_comment_unicode() {
        let mut value = b"UNICODE\0".to_vec();
        for unit in "猫と月".encode_utf16() {
            value.extend_from_slice(&unit.to_le_bytes());
        }
        let tiff = tiff_with(TAG_USER_COMMENT, 7, &value, true);
        assert_eq!(extract(&tiff).unwrap().text, "猫と月");
    }

    #[test]
    fn test_unicode_prefix_with_empty_tail_is_blank() {
        let value = b"UNICODE\0".to_vec();
        let tiff = tiff_with(TAG_USER_COMMENT, 7, &value, true);
        assert!(extract(&tiff).is_none());
    }

    #[test]
    fn test_image_description() {
        let tiff = tiff_with(TAG_IMAGE_DESCRIPTION, 2, b"harbor at dusk\0", false);
        assert_eq!(extract(&tiff).unwrap().text, "harbor at dusk");
    }

    #[test]
    fn test_xp_comment_utf16le() {
        let mut value = Vec::new();
        for unit in "rainy street".encode_utf16() {
            value.extend_from_slice(&unit.to_le_bytes());
        }
        value.extend_from_slice(&[0, 0]);
        let tiff = tiff_with(TAG_XP_COMMENT, 1, &value, false);
        assert_eq!(extract(&tiff).unwrap().text, "rainy street");
    }

    #[test]
    fn test_behind_jpeg_app1_marker() {
        let tiff = tiff_with(TAG_IMAGE_DESCRIPTION, 2, b"via app1\0", false);
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1, 0, 0];
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&tiff);
        assert_eq!(extract(&jpeg).unwrap().text, "via app1");
    }

    #[test]
    fn test_big_endian_header() {
        // MM header with a nonsense IFD offset: header parses, walk finds nothing.
        let tiff = [0x4D, 0x4D, 0x00, 0x2A, 0xFF, 0xFF, 0xFF, 0xF0];
        assert!(extract(&tiff).is_none());
    }

    #[test]
    fn test_truncated_value_offset() {
        let mut tiff = tiff_with(TAG_IMAGE_DESCRIPTION, 2, b"will be cut\0", false);
        tiff.truncate(tiff.len() - 8);
        assert!(extract(&tiff).is_none());
    }

    #[test]
    fn test_not_tiff_at_all() {
        assert!(extract(b"random bytes with no markers").is_none());
    }
}
