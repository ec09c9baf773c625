use proptest::prelude::*;

use ember_types::{Hash, Timestamp};

proptest! {
    /// Hash hex roundtrip: to_string -> parse produces an identical digest.
    #[test]
    fn hash_hex_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = Hash::new(bytes);
        let parsed: Hash = hash.to_string().parse().unwrap();
        prop_assert_eq!(parsed, hash);
    }

    /// Hash JSON roundtrip through serde.
    #[test]
    fn hash_json_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = Hash::new(bytes);
        let encoded = serde_json::to_string(&hash).unwrap();
        let decoded: Hash = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, hash);
    }

    /// is_zero holds exactly for the all-zeros digest.
    #[test]
    fn hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = Hash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// leading_zero_bits is bounded by 256 and consistent with the first
    /// nonzero byte's position.
    #[test]
    fn leading_zero_bits_bounded(bytes in prop::array::uniform32(0u8..)) {
        let hash = Hash::new(bytes);
        let bits = hash.leading_zero_bits();
        prop_assert!(bits <= 256);

        match bytes.iter().position(|b| *b != 0) {
            None => prop_assert_eq!(bits, 256),
            Some(i) => {
                prop_assert!(bits >= i as u32 * 8);
                prop_assert!(bits < (i as u32 + 1) * 8);
            }
        }
    }

    /// A digest with n leading zero bits meets every target up to n.
    #[test]
    fn leading_zero_bits_monotone(bytes in prop::array::uniform32(0u8..), target in 0u32..=256) {
        let bits = Hash::new(bytes).leading_zero_bits();
        if bits >= target {
            for lower in (0..target).step_by(13) {
                prop_assert!(bits >= lower);
            }
        }
    }

    /// Timestamp ordering matches the underlying milliseconds.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::from_millis(a);
        let tb = Timestamp::from_millis(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// millis_until inverts addition and saturates at zero.
    #[test]
    fn timestamp_millis_until(base in 0u64..1_000_000, offset in 0u64..1_000_000) {
        let start = Timestamp::from_millis(base);
        let later = Timestamp::from_millis(base + offset);
        prop_assert_eq!(start.millis_until(later), offset);
        prop_assert_eq!(later.millis_until(start), 0);
    }
}
