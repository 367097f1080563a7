//! `0x`-prefixed hexadecimal fields as they appear in chain descriptor files.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hexadecimal string with a `0x` prefix.
///
/// Kept as text so a descriptor written back to disk is byte-for-byte what
/// the user wrote; decoding happens on demand with the length the field
/// requires.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixedHex(String);

impl PrefixedHex {
    /// Wrap a string without checking it
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Encode bytes as `0x…`
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// The raw text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the field was left out entirely
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn digits(&self) -> Result<&str, HexError> {
        match self.0.as_str() {
            "" => Ok(""),
            s => s.strip_prefix("0x").ok_or(HexError::MissingPrefix),
        }
    }

    /// Decode into a fixed-size buffer.
    ///
    /// An empty field and a bare `0x` both decode to all zeroes; anything
    /// else must carry exactly `2 * N` hex digits.
    pub fn decode_fixed<const N: usize>(&self) -> Result<[u8; N], HexError> {
        let digits = self.digits()?;
        let mut out = [0u8; N];
        if digits.is_empty() {
            return Ok(out);
        }
        if digits.len() != 2 * N {
            return Err(HexError::WrongLength {
                expected: N,
                actual: digits.len() / 2,
            });
        }
        hex::decode_to_slice(digits, &mut out).map_err(HexError::Invalid)?;
        Ok(out)
    }

    /// Decode a variable-length field
    pub fn to_bytes(&self) -> Result<Vec<u8>, HexError> {
        let digits = self.digits()?;
        hex::decode(digits).map_err(HexError::Invalid)
    }
}

impl fmt::Debug for PrefixedHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for PrefixedHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrefixedHex {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Hex field decoding errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HexError {
    /// The value does not start with `0x`
    #[error("want 0x prefix")]
    MissingPrefix,
    /// The value has the wrong number of bytes
    #[error("want {expected} bytes, got {actual}")]
    WrongLength {
        /// Required byte count
        expected: usize,
        /// Byte count found
        actual: usize,
    },
    /// The digits are not valid hex
    #[error("{0}")]
    Invalid(hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_bare_prefix_decode_to_zero() {
        assert_eq!(PrefixedHex::new("").decode_fixed::<4>(), Ok([0u8; 4]));
        assert_eq!(PrefixedHex::new("0x").decode_fixed::<4>(), Ok([0u8; 4]));
        assert_eq!(PrefixedHex::new("0x").to_bytes(), Ok(vec![]));
    }

    #[test]
    fn test_fixed_length_is_enforced() {
        let short = PrefixedHex::new("0x0102");
        assert_eq!(
            short.decode_fixed::<4>(),
            Err(HexError::WrongLength {
                expected: 4,
                actual: 2
            })
        );
        assert_eq!(short.decode_fixed::<2>(), Ok([1, 2]));
    }

    #[test]
    fn test_prefix_is_required() {
        assert_eq!(
            PrefixedHex::new("0102").to_bytes(),
            Err(HexError::MissingPrefix)
        );
    }

    #[test]
    fn test_non_hex_digits() {
        assert!(matches!(
            PrefixedHex::new("0xzz").decode_fixed::<1>(),
            Err(HexError::Invalid(_))
        ));
        assert_eq!(
            PrefixedHex::new("0x0z").to_bytes(),
            Err(HexError::Invalid(hex::FromHexError::InvalidHexCharacter {
                c: 'z',
                index: 1
            }))
        );
    }

    #[test]
    fn test_from_bytes() {
        assert_eq!(PrefixedHex::from_bytes(&[0xab, 0x01]).as_str(), "0xab01");
    }
}
