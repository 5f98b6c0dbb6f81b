//! Property-based tests for Sereal format primitives

use proptest::prelude::*;
use sereal_format::varint::{
    decode_varint, encode_varint, varint_length, zigzag_decode, zigzag_encode,
};

proptest! {
    #[test]
    fn varint_roundtrip_property(value in any::<u64>()) {
        let encoded = encode_varint(value);
        let (decoded, consumed) = decode_varint(&encoded).expect("decode varint");
        prop_assert_eq!(value, decoded);
        prop_assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn varint_minimality_property(value in any::<u64>()) {
        let encoded = encode_varint(value);

        // at most 10 bytes for a u64, and the claimed length matches
        prop_assert!(encoded.len() <= 10);
        prop_assert_eq!(encoded.len(), varint_length(value));

        // minimal form: the terminating byte never has the continuation
        // bit, and is nonzero unless the whole value is a single byte
        let last = *encoded.last().unwrap();
        prop_assert_eq!(last & 0x80, 0);
        if encoded.len() > 1 {
            prop_assert!(last != 0);
        }
    }

    #[test]
    fn varint_non_minimal_tolerance_property(value in any::<u64>(), padding in 1usize..3) {
        // re-encode the terminating byte with redundant continuation bytes,
        // the way the compression frame patches a reserved length slot
        let mut padded: Vec<u8> = encode_varint(value).to_vec();
        if padded.len() + padding > 10 {
            return Ok(());
        }
        *padded.last_mut().unwrap() |= 0x80;
        for _ in 1..padding {
            padded.push(0x80);
        }
        padded.push(0x00);

        let (decoded, consumed) = decode_varint(&padded).expect("decode padded varint");
        prop_assert_eq!(value, decoded);
        prop_assert_eq!(consumed, padded.len());
    }

    #[test]
    fn zigzag_roundtrip_property(value in any::<i64>()) {
        prop_assert_eq!(value, zigzag_decode(zigzag_encode(value)));
    }

    #[test]
    fn zigzag_small_values_stay_small_property(value in -64i64..64) {
        // small magnitudes map into the single-byte varint range
        prop_assert!(zigzag_encode(value) <= 127);
    }
}
