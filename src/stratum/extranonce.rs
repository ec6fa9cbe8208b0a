//! Extranonce values.
//!
//! Extranonce1 comes from the subscribe response and lives for the session.
//! Extranonce2 is freshly randomized for every scan pass, so restarts and
//! parallel workers explore disjoint regions of the coinbase space.

use rand::RngCore;
use std::fmt;

/// A pool- or miner-chosen extranonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extranonce(Vec<u8>);

impl Extranonce {
    /// A random extranonce of exactly `size` bytes.
    pub fn random(size: usize) -> Self {
        let mut bytes = vec![0u8; size];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(s)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Extranonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_has_requested_size() {
        assert_eq!(Extranonce::random(4).len(), 4);
        assert_eq!(Extranonce::random(8).len(), 8);
        assert!(Extranonce::random(0).is_empty());
    }

    #[test]
    fn test_hex_round_trip() {
        let en = Extranonce::from_hex("deadbeef").unwrap();
        assert_eq!(en.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(en.to_hex(), "deadbeef");
    }

    #[test]
    fn test_hex_encoding_matches_size() {
        // A pool that hands out extranonce2_size = 4 expects exactly 8 hex
        // characters back.
        let en = Extranonce::random(4);
        assert_eq!(en.to_hex().len(), 8);
    }
}
