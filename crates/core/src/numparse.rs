//! String-to-number conversion shared by the lexer, the JSON loader,
//! and the `int`/`float` builtins.

use crate::error::{ErrorClass, EvcError};

/// Parse an integer literal body: decimal, `0x...` hex, or `0b...`
/// binary, with an optional leading sign.
pub fn parse_int(text: &str) -> Result<i64, EvcError> {
    let t = text.trim();
    let (neg, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let parsed = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map(|v| if neg { v.wrapping_neg() } else { v })
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).map(|v| if neg { v.wrapping_neg() } else { v })
    } else {
        // Decimal keeps its sign attached so i64::MIN parses.
        t.parse::<i64>()
    };
    parsed.map_err(|_| {
        EvcError::new(
            ErrorClass::Value,
            format!("invalid integer literal '{text}'"),
        )
    })
}

/// Parse a float literal body: optional integer part, decimal point,
/// optional fraction, optional exponent.
pub fn parse_float(text: &str) -> Result<f64, EvcError> {
    let t = text.trim();
    t.parse::<f64>().map_err(|_| {
        EvcError::new(
            ErrorClass::Value,
            format!("invalid float literal '{text}'"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_bases() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("0x2a").unwrap(), 42);
        assert_eq!(parse_int("0b101010").unwrap(), 42);
        assert_eq!(parse_int("-7").unwrap(), -7);
        assert!(parse_int("12ab").is_err());
    }

    #[test]
    fn test_int_str_round_trip() {
        for i in [0i64, 1, -1, 42, i64::MAX, i64::MIN] {
            assert_eq!(parse_int(&i.to_string()).unwrap(), i);
        }
    }

    #[test]
    fn test_floats() {
        assert_eq!(parse_float("1.5").unwrap(), 1.5);
        assert_eq!(parse_float(".5").unwrap(), 0.5);
        assert_eq!(parse_float("1e3").unwrap(), 1000.0);
        assert_eq!(parse_float("2.5e-1").unwrap(), 0.25);
        assert!(parse_float("1.2.3").is_err());
    }
}
