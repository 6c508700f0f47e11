//! Property-based tests for domain types, ABI decoding and batch windowing

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::arithmetic_side_effects)]

use alloy_primitives::U256;
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::decoder::abi::{self, scale_amount};
use crate::indexer::chain_service::{next_batch_window, resume_point};
use crate::store::MemoryStore;
use crate::types::{Address, BlockNumber, TransactionHash};

fn hex_string(len: usize) -> impl Strategy<Value = String> {
    proptest::string::string_regex(&format!("[0-9a-fA-F]{{{len}}}")).unwrap()
}

fn hex_string_with_prefix(len: usize) -> impl Strategy<Value = String> {
    (hex_string(len), prop::bool::ANY).prop_map(|(hex, with_prefix)| {
        if with_prefix {
            format!("0x{hex}")
        } else {
            hex
        }
    })
}

fn block_number() -> impl Strategy<Value = i64> {
    0..=1_000_000_000i64
}

proptest! {
    #[test]
    fn prop_block_number_hex_round_trip(value in block_number()) {
        let block = BlockNumber::new(value).unwrap();
        prop_assert_eq!(BlockNumber::from_hex(&block.to_hex()).unwrap(), block);
    }

    #[test]
    fn prop_negative_block_numbers_rejected(value in i64::MIN..0) {
        prop_assert!(BlockNumber::new(value).is_err());
    }

    /// Addresses compare equal regardless of case or prefix
    #[test]
    fn prop_address_normalization(hex in hex_string_with_prefix(40)) {
        let address = Address::new(&hex).unwrap();
        prop_assert!(address.value().starts_with("0x"));
        prop_assert_eq!(address.value().len(), 42);
        prop_assert_eq!(address.value(), address.value().to_ascii_lowercase());
        prop_assert_eq!(Address::new(hex.to_ascii_uppercase().replace("0X", "0x")).unwrap(), address);
    }

    #[test]
    fn prop_address_from_topic(hex in hex_string(40)) {
        let topic = format!("0x{}{}", "0".repeat(24), hex);
        let address = Address::from_topic(&topic).unwrap();
        prop_assert_eq!(address, Address::new(&hex).unwrap());
    }

    #[test]
    fn prop_address_wrong_length_rejected(short in hex_string(39), long in hex_string(41)) {
        prop_assert!(Address::new(short).is_err());
        prop_assert!(Address::new(long).is_err());
    }

    #[test]
    fn prop_transaction_hash_normalization(hex in hex_string_with_prefix(64)) {
        let hash = TransactionHash::new(&hex).unwrap();
        prop_assert_eq!(hash.value().len(), 66);
        prop_assert_eq!(hash.value(), hash.value().to_ascii_lowercase());
    }

    /// `scale_amount(raw, d) * 10^d == raw`
    #[test]
    fn prop_scale_amount_exact(raw in any::<u64>(), decimals in 0u8..=18) {
        let scaled = scale_amount(U256::from(raw), decimals).unwrap();
        let expected = Decimal::from_i128_with_scale(i128::from(raw), u32::from(decimals));
        prop_assert_eq!(scaled, expected);
    }

    #[test]
    fn prop_uint256_word_decodes(value in any::<u128>()) {
        let word = abi::encode::uint256(value);
        prop_assert_eq!(abi::decode_uint256(&word), Some(U256::from(value)));
    }

    #[test]
    fn prop_string_return_decodes(value in "[a-zA-Z0-9]{1,80}") {
        let encoded = abi::encode::string(&value);
        prop_assert_eq!(abi::decode_string(&encoded), Some(value));
    }

    /// Windows never pass head, never exceed the batch size and start at resume
    #[test]
    fn prop_batch_window_bounds(
        resume in block_number(),
        head in block_number(),
        batch_size in 1u32..=10_000,
    ) {
        let resume = BlockNumber::from_trusted(resume);
        let head = BlockNumber::from_trusted(head);
        match next_batch_window(resume, head, batch_size) {
            Some((from, to)) => {
                prop_assert!(resume <= head);
                prop_assert_eq!(from, resume);
                prop_assert!(to <= head);
                prop_assert!(from <= to);
                prop_assert!(to.value() - from.value() < i64::from(batch_size));
            }
            None => prop_assert!(resume > head),
        }
    }

    #[test]
    fn prop_resume_point_follows_checkpoint(
        checkpoint in block_number(),
        start in proptest::option::of(block_number()),
        head in block_number(),
        offset in 0u64..1_000,
    ) {
        let checkpoint = BlockNumber::from_trusted(checkpoint);
        let resume = resume_point(Some(checkpoint), start, BlockNumber::from_trusted(head), offset);
        prop_assert_eq!(resume, checkpoint + 1);
    }

    #[test]
    fn prop_resume_point_never_negative(head in block_number(), offset in any::<u64>()) {
        let resume = resume_point(None, None, BlockNumber::from_trusted(head), offset);
        prop_assert!(resume.value() >= 0);
        prop_assert!(resume.value() <= head);
    }

    /// Whatever order checkpoints arrive in, the stored one is the maximum
    #[test]
    fn prop_checkpoint_monotonic(updates in prop::collection::vec(block_number(), 1..20)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let store = MemoryStore::new();

        let latest = runtime.block_on(async {
            for block in &updates {
                store
                    .update_latest_block("ethereum", BlockNumber::from_trusted(*block))
                    .await
                    .unwrap();
            }
            store.get_latest_block("ethereum").await.unwrap()
        });

        prop_assert_eq!(latest.map(|b| b.value()), updates.iter().max().copied());
    }
}
