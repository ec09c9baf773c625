//! SHA-256 digest type used for block and transaction identities.

use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// A 32-byte SHA-256 digest.
///
/// Rendered as 64 lowercase hex characters everywhere it crosses a
/// serialization boundary (JSON, hash preimages, logs). The all-zeros
/// digest doubles as the `previous_hash` sentinel of a genesis block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zeros digest — genesis `previous_hash` sentinel.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Number of leading zero bits when the digest is read big-endian.
    ///
    /// This is the proof-of-work measure: a block hash "meets" difficulty
    /// `D` when `leading_zero_bits() >= floor(log2(D))`.
    pub fn leading_zero_bits(&self) -> u32 {
        let mut bits = 0;
        for byte in &self.0 {
            if *byte == 0 {
                bits += 8;
            } else {
                bits += byte.leading_zeros();
                break;
            }
        }
        bits
    }
}

impl FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(TypeError::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| TypeError::InvalidHash(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_sentinel() {
        assert!(Hash::ZERO.is_zero());
        assert_eq!(Hash::ZERO.to_string(), "0".repeat(64));
    }

    #[test]
    fn hex_roundtrip() {
        let h = Hash::new([0xAB; 32]);
        let parsed: Hash = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn rejects_short_and_non_hex() {
        assert!("abcd".parse::<Hash>().is_err());
        assert!("zz".repeat(32).parse::<Hash>().is_err());
    }

    #[test]
    fn leading_zero_bits_counts_big_endian() {
        assert_eq!(Hash::ZERO.leading_zero_bits(), 256);

        let mut bytes = [0u8; 32];
        bytes[0] = 0x80;
        assert_eq!(Hash::new(bytes).leading_zero_bits(), 0);

        bytes[0] = 0x01;
        assert_eq!(Hash::new(bytes).leading_zero_bits(), 7);

        bytes[0] = 0x00;
        bytes[1] = 0x10;
        assert_eq!(Hash::new(bytes).leading_zero_bits(), 11);
    }

    #[test]
    fn json_form_is_hex_string() {
        let h = Hash::new([0x01; 32]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
