//! UTF-8 encode/decode helpers.
//!
//! These operate on raw byte buffers rather than `str` because script
//! sources and file reads may carry invalid sequences, which the string
//! type preserves byte-wise (see `strings`).

/// Highest valid Unicode code point.
pub const UNICODE_MAX: u32 = 0x10_FFFF;

/// True for code points that may appear in a string: everything up to
/// `U+10FFFF` except the surrogate range.
pub fn valid_unicode(point: u32) -> bool {
    point <= UNICODE_MAX && !(0xD800..=0xDFFF).contains(&point)
}

/// Append the UTF-8 encoding of `point` to `out`.
///
/// `point` must be valid Unicode (see [`valid_unicode`]); ASCII is
/// emitted as a single byte.
pub fn utf8_encode(point: u32, out: &mut Vec<u8>) {
    if point < 0x80 {
        out.push(point as u8);
    } else if point < 0x800 {
        out.push(0xC0 | (point >> 6) as u8);
        out.push(0x80 | (point & 0x3F) as u8);
    } else if point < 0x1_0000 {
        out.push(0xE0 | (point >> 12) as u8);
        out.push(0x80 | ((point >> 6) & 0x3F) as u8);
        out.push(0x80 | (point & 0x3F) as u8);
    } else {
        out.push(0xF0 | (point >> 18) as u8);
        out.push(0x80 | ((point >> 12) & 0x3F) as u8);
        out.push(0x80 | ((point >> 6) & 0x3F) as u8);
        out.push(0x80 | (point & 0x3F) as u8);
    }
}

/// Decode one code point from the front of `src`.
///
/// Returns `Some((point, bytes_consumed))`, or `None` if `src` is empty
/// or starts with a malformed sequence (bad lead byte, truncated or bad
/// continuation bytes, surrogate, overlong reaching past `U+10FFFF`).
pub fn utf8_decode_one(src: &[u8]) -> Option<(u32, usize)> {
    let lead = *src.first()?;
    let (mut point, ncont) = if lead & 0x80 == 0 {
        return Some((lead as u32, 1));
    } else if lead & 0xE0 == 0xC0 {
        ((lead & 0x1F) as u32, 1)
    } else if lead & 0xF0 == 0xE0 {
        ((lead & 0x0F) as u32, 2)
    } else if lead & 0xF8 == 0xF0 {
        ((lead & 0x07) as u32, 3)
    } else {
        return None;
    };

    if src.len() < 1 + ncont {
        return None;
    }
    for &c in &src[1..1 + ncont] {
        if c & 0xC0 != 0x80 {
            return None;
        }
        point = (point << 6) | (c & 0x3F) as u32;
    }
    if valid_unicode(point) {
        Some((point, 1 + ncont))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_valid_points() {
        let mut buf = Vec::new();
        for point in 0..=UNICODE_MAX {
            if !valid_unicode(point) {
                continue;
            }
            buf.clear();
            utf8_encode(point, &mut buf);
            let (decoded, used) = utf8_decode_one(&buf).expect("decodable");
            assert_eq!(decoded, point);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn test_rejects_surrogates() {
        assert!(!valid_unicode(0xD800));
        assert!(!valid_unicode(0xDFFF));
        // A surrogate hand-encoded as UTF-8 (CESU-8 style) must not decode.
        assert_eq!(utf8_decode_one(&[0xED, 0xA0, 0x80]), None);
    }

    #[test]
    fn test_rejects_truncated_and_stray_continuation() {
        assert_eq!(utf8_decode_one(&[0xE2, 0x82]), None);
        assert_eq!(utf8_decode_one(&[0x80]), None);
        assert_eq!(utf8_decode_one(&[0xFF]), None);
    }

    #[test]
    fn test_multibyte_examples() {
        assert_eq!(utf8_decode_one("é".as_bytes()), Some((0xE9, 2)));
        assert_eq!(utf8_decode_one("€".as_bytes()), Some((0x20AC, 3)));
        assert_eq!(utf8_decode_one("𐍈".as_bytes()), Some((0x10348, 4)));
    }
}
