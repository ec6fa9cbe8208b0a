//! Share difficulty, for logs and statistics.
//!
//! Pools and miners talk about work in multiples of the difficulty-1
//! target; a hash's difficulty is how far below that target it landed.
//! Nothing here affects share validation, which compares against the full
//! target directly.

use ruint::aliases::U256;

/// The difficulty-1 target, 0x00000000ffff0000...00.
fn diff1() -> U256 {
    let mut be = [0u8; 32];
    be[4] = 0xff;
    be[5] = 0xff;
    U256::from_be_bytes(be)
}

/// Difficulty represented by a share hash: `diff1 / hash`, saturating
/// to `u64::MAX` for the (rather hypothetical) all-zero digest.
pub fn of_hash(hash: &[u8; 32]) -> u64 {
    let value = U256::from_le_bytes(*hash);
    if value == U256::ZERO {
        return u64::MAX;
    }
    (diff1() / value).saturating_to()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_one() {
        let mut hash = diff1().to_le_bytes::<32>();
        assert_eq!(of_hash(&hash), 1);

        // Halving the hash doubles the difficulty.
        hash = (diff1() / U256::from(2u64)).to_le_bytes::<32>();
        assert_eq!(of_hash(&hash), 2);
    }

    #[test]
    fn test_zero_hash_saturates() {
        assert_eq!(of_hash(&[0u8; 32]), u64::MAX);
    }

    #[test]
    fn test_large_hash_is_below_difficulty_one() {
        assert_eq!(of_hash(&[0xff; 32]), 0);
    }
}
