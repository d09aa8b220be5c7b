//! Property-based tests for the Huffman codec.
//!
//! These tests use proptest to verify:
//! - Encode/decode roundtrip for arbitrary inputs
//! - Every derived code table is prefix-free
//! - Padding and bit length agree with the code table
//! - Decoding never panics on arbitrary bytes and rejects corrupted payloads

#![cfg(test)]

use proptest::prelude::*;

use crate::huffman::{compression_ratio, decode, encode, EncodedPayload};

/// Inputs biased toward small alphabets, where codes get long and uneven.
fn arb_skewed_input() -> impl Strategy<Value = Vec<u8>> {
    (1u8..=8, prop::collection::vec(any::<u8>(), 1..2048))
        .prop_map(|(alphabet, raw)| raw.into_iter().map(|b| b % alphabet).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn roundtrip_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let (payload, _) = encode(&data).unwrap();
        prop_assert_eq!(decode(&payload).unwrap(), data);
    }

    #[test]
    fn roundtrip_skewed_bytes(data in arb_skewed_input()) {
        let (payload, _) = encode(&data).unwrap();
        prop_assert_eq!(decode(&payload).unwrap(), data);
    }

    #[test]
    fn code_table_is_prefix_free(data in prop::collection::vec(any::<u8>(), 1..1024)) {
        let payload = EncodedPayload::build(&data).unwrap().unwrap();
        prop_assert!(payload.code_table.is_prefix_free());

        let distinct = data.iter().collect::<std::collections::HashSet<_>>().len();
        prop_assert_eq!(payload.code_table.len(), distinct);
    }

    #[test]
    fn padding_matches_bit_length(data in arb_skewed_input()) {
        let payload = EncodedPayload::build(&data).unwrap().unwrap();
        let bits: usize = data
            .iter()
            .map(|&b| payload.code_table.get(b).unwrap().len())
            .sum();

        prop_assert!(payload.padding_bits <= 7);
        prop_assert_eq!(payload.bit_len(), bits);
        prop_assert_eq!(payload.padding_bits as usize, (8 - bits % 8) % 8);
    }

    #[test]
    fn ratio_matches_payload_size(data in prop::collection::vec(any::<u8>(), 1..1024)) {
        let (payload, ratio) = encode(&data).unwrap();
        prop_assert_eq!(ratio, compression_ratio(data.len(), payload.len()));
    }

    #[test]
    fn decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode(&data);
    }

    #[test]
    fn corrupt_payload_is_rejected(
        data in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let (mut payload, _) = encode(&data).unwrap();
        let i = index.index(payload.len());
        payload[i] ^= flip;
        prop_assert!(decode(&payload).is_err());
    }
}
