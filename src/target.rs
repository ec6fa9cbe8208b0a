//! Compact-target expansion and share validation.

use bitcoin::CompactTarget;

/// Expanded 256-bit difficulty target.
///
/// Stored in the digest's byte order (least significant byte first) so that
/// comparison walks the same words the kernel emits, most significant word
/// down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target([u8; 32]);

impl Target {
    /// Expand compact bits.
    ///
    /// The first byte of nbits is a base-256 exponent `e`, the remaining
    /// three a mantissa `m`; the target is `m * 256^(e-3)`. For `e <= 3`
    /// the mantissa shifts right instead.
    pub fn from_compact(nbits: CompactTarget) -> Self {
        let bits = nbits.to_consensus();
        let exponent = ((bits >> 24) as usize).min(32);
        let mantissa = bits & 0x00ff_ffff;

        let mut be = [0u8; 32];
        if exponent <= 3 {
            let shifted = mantissa >> (8 * (3 - exponent));
            be[29..32].copy_from_slice(&shifted.to_be_bytes()[1..4]);
        } else {
            for (i, byte) in mantissa.to_be_bytes()[1..4].iter().enumerate() {
                be[32 - exponent + i] = *byte;
            }
        }

        be.reverse();
        Self(be)
    }

    /// Compare a digest against the target, word by word from the most
    /// significant 32-bit word downward. Equality counts as met.
    pub fn is_met_by(&self, hash: &[u8; 32]) -> bool {
        for i in (0..8).rev() {
            let h = u32::from_le_bytes([
                hash[4 * i],
                hash[4 * i + 1],
                hash[4 * i + 2],
                hash[4 * i + 3],
            ]);
            let t = u32::from_le_bytes([
                self.0[4 * i],
                self.0[4 * i + 1],
                self.0[4 * i + 2],
                self.0[4 * i + 3],
            ]);
            if h < t {
                return true;
            }
            if h > t {
                return false;
            }
        }
        true
    }

    /// Big-endian bytes, for logs and tests.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }
}
