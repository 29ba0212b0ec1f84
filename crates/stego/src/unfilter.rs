//! PNG scanline reconstruction.
//!
//! Inflated `IDAT` data is a sequence of scanlines, each prefixed by one
//! filter-type byte. Reconstruction undoes the per-byte prediction relative
//! to the byte `channels` positions to the left and the row above. The
//! forward direction ([`filter`]) exists for callers constructing pixel
//! data fixtures.

use crate::error::{ErrorKind, Result};

const FILTER_NONE: u8 = 0;
const FILTER_SUB: u8 = 1;
const FILTER_UP: u8 = 2;
const FILTER_AVERAGE: u8 = 3;
const FILTER_PAETH: u8 = 4;

/// The Paeth predictor: whichever of `a` (left), `b` (above), `c` (above
/// left) is closest to `a + b - c`, ties broken in that order.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Reconstruct raw pixel bytes from filtered scanline data.
///
/// `data` must be exactly `height * (1 + width * channels)` bytes. Returns
/// `width * height * channels` reconstructed bytes, or an error for a
/// length mismatch or an undefined filter type.
pub fn unfilter(data: &[u8], width: usize, height: usize, channels: usize) -> Result<Vec<u8>> {
    // Dimensions come straight from a parsed IHDR and may be garbage;
    // overflow reads as a mismatch against whatever data actually arrived.
    let expected = width
        .checked_mul(channels)
        .and_then(|stride| stride.checked_add(1))
        .and_then(|row| height.checked_mul(row));
    let Some(expected) = expected else {
        exn::bail!(ErrorKind::LengthMismatch { expected: usize::MAX, actual: data.len() });
    };
    if data.len() != expected {
        exn::bail!(ErrorKind::LengthMismatch { expected, actual: data.len() });
    }
    let stride = width * channels;
    let mut out = vec![0u8; height * stride];
    for row in 0..height {
        let line = &data[row * (1 + stride) + 1..row * (1 + stride) + 1 + stride];
        let filter = data[row * (1 + stride)];
        let prior_start = (row.max(1) - 1) * stride;
        for i in 0..stride {
            let at = row * stride + i;
            let left = if i >= channels { out[at - channels] } else { 0 };
            let above = if row > 0 { out[prior_start + i] } else { 0 };
            let above_left = if row > 0 && i >= channels { out[prior_start + i - channels] } else { 0 };
            out[at] = match filter {
                FILTER_NONE => line[i],
                FILTER_SUB => line[i].wrapping_add(left),
                FILTER_UP => line[i].wrapping_add(above),
                FILTER_AVERAGE => {
                    line[i].wrapping_add(((u16::from(left) + u16::from(above)) / 2) as u8)
                },
                FILTER_PAETH => line[i].wrapping_add(paeth(left, above, above_left)),
                other => exn::bail!(ErrorKind::UnknownFilter(other)),
            };
        }
    }
    Ok(out)
}

/// Apply one filter type to every scanline of a raw bitmap, producing the
/// `height * (1 + width * channels)` byte layout [`unfilter`] consumes.
pub fn filter(pixels: &[u8], width: usize, height: usize, channels: usize, ftype: u8) -> Vec<u8> {
    let stride = width * channels;
    let mut out = Vec::with_capacity(height * (1 + stride));
    for row in 0..height {
        out.push(ftype);
        for i in 0..stride {
            let at = row * stride + i;
            let raw = pixels[at];
            let left = if i >= channels { pixels[at - channels] } else { 0 };
            let above = if row > 0 { pixels[at - stride] } else { 0 };
            let above_left = if row > 0 && i >= channels { pixels[at - stride - channels] } else { 0 };
            out.push(match ftype {
                FILTER_SUB => raw.wrapping_sub(left),
                FILTER_UP => raw.wrapping_sub(above),
                FILTER_AVERAGE => {
                    raw.wrapping_sub(((u16::from(left) + u16::from(above)) / 2) as u8)
                },
                FILTER_PAETH => raw.wrapping_sub(paeth(left, above, above_left)),
                _ => raw,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn bitmap(width: usize, height: usize, channels: usize) -> Vec<u8> {
        (0..width * height * channels).map(|i| (i * 37 % 251) as u8).collect()
    }

    #[rstest]
    #[case(FILTER_NONE)]
    #[case(FILTER_SUB)]
    #[case(FILTER_UP)]
    #[case(FILTER_AVERAGE)]
    #[case(FILTER_PAETH)]
    fn test_filter_roundtrip_rgba(#[case] ftype: u8) {
        let pixels = bitmap(5, 4, 4);
        let filtered = filter(&pixels, 5, 4, 4, ftype);
        assert_eq!(unfilter(&filtered, 5, 4, 4).unwrap(), pixels);
    }

    #[rstest]
    #[case(FILTER_SUB)]
    #[case(FILTER_PAETH)]
    fn test_filter_roundtrip_gray_alpha(#[case] ftype: u8) {
        let pixels = bitmap(7, 3, 2);
        let filtered = filter(&pixels, 7, 3, 2, ftype);
        assert_eq!(unfilter(&filtered, 7, 3, 2).unwrap(), pixels);
    }

    #[test]
    fn test_unknown_filter_type() {
        let data = vec![9u8, 0, 0, 0, 0];
        let err = unfilter(&data, 1, 1, 4).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownFilter(9)));
    }

    #[test]
    fn test_oversized_dimensions_are_a_mismatch() {
        // The expected length would overflow usize; must not panic.
        let err = unfilter(&[0u8; 16], usize::MAX, usize::MAX, 4).unwrap_err();
        assert!(matches!(&*err, ErrorKind::LengthMismatch { .. }));
    }

    #[test]
    fn test_length_mismatch() {
        let err = unfilter(&[0u8; 10], 2, 2, 4).unwrap_err();
        assert!(matches!(&*err, ErrorKind::LengthMismatch { expected: 18, actual: 10 }));
    }

    #[test]
    fn test_paeth_tie_breaks_toward_left() {
        // a == b == c makes all three candidates equidistant.
        assert_eq!(paeth(10, 10, 10), 10);
        assert_eq!(paeth(3, 7, 5), 5);
    }
}
