//! FNV-1a string hashing.
//!
//! Dictionary keys and interned identifiers hash with 64-bit FNV-1a over
//! their UTF-8 byte form. A result of zero is bumped to one so that zero
//! can serve as the "not yet computed" sentinel in memoizing callers.

const FNV_OFFSET: u64 = 0xCBF2_9CE4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

/// Hash a byte slice with FNV-1a. Never returns zero.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    if hash == 0 { 1 } else { hash }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // FNV-1a of the empty input is the offset basis.
        assert_eq!(fnv1a(b""), FNV_OFFSET);
    }

    #[test]
    fn test_never_zero() {
        assert_ne!(fnv1a(b"a"), 0);
        assert_ne!(fnv1a(b"hello world"), 0);
    }

    #[test]
    fn test_equal_inputs_equal_hashes() {
        assert_eq!(fnv1a("caf\u{e9}".as_bytes()), fnv1a("caf\u{e9}".as_bytes()));
        assert_ne!(fnv1a(b"abc"), fnv1a(b"abd"));
    }
}
