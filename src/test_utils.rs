//! # Test Utilities
//!
//! Shared fixtures for unit tests across the crate.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(dead_code)]

#[cfg(test)]
pub mod fixtures {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use crate::rpc::{RawLog, TRANSFER_TOPIC};
    use crate::types::{Address, BlockNumber, TransactionHash, TransferDraft, TransferEvent};

    pub const TOKEN_X: &str = "0x00000000000000000000000000000000000000aa";
    pub const TOKEN_Y: &str = "0x00000000000000000000000000000000000000bb";

    /// A deterministic address ending in `n`
    pub fn address(n: u64) -> String {
        format!("0x{n:040x}")
    }

    pub fn tx_hash(block: i64, log_index: i64) -> String {
        format!("0x{block:032x}{log_index:032x}")
    }

    pub fn topic_for(address: &str) -> String {
        format!("0x{:0>64}", address.trim_start_matches("0x"))
    }

    /// A well-formed Transfer log for `token`
    pub fn transfer_log(
        token: &str,
        from: impl AsRef<str>,
        to: impl AsRef<str>,
        value: u128,
        block: i64,
        log_index: i64,
    ) -> RawLog {
        RawLog {
            address: token.to_string(),
            topics: vec![
                TRANSFER_TOPIC.to_string(),
                topic_for(from.as_ref()),
                topic_for(to.as_ref()),
            ],
            data: format!("0x{value:064x}"),
            block_number: Some(format!("0x{block:x}")),
            transaction_hash: Some(tx_hash(block, log_index)),
            log_index: Some(format!("0x{log_index:x}")),
            removed: false,
            block_timestamp: None,
        }
    }

    pub fn timestamp(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    pub fn draft(chain: &str, block: i64, log_index: i64) -> TransferDraft {
        TransferDraft {
            chain: chain.to_string(),
            tx_hash: TransactionHash::new(tx_hash(block, log_index)).unwrap(),
            log_index,
            block_number: BlockNumber::from_trusted(block),
            timestamp: None,
            from: Address::new(address(1)).unwrap(),
            to: Address::new(address(2)).unwrap(),
            token_address: Address::new(TOKEN_X).unwrap(),
            token_symbol: "TKN".to_string(),
            amount: Decimal::ONE,
        }
    }

    pub fn transfer_event(chain: &str, block: i64, log_index: i64) -> TransferEvent {
        let draft = draft(chain, block, log_index);
        TransferEvent {
            chain: draft.chain,
            tx_hash: draft.tx_hash,
            log_index: draft.log_index,
            block_number: draft.block_number,
            timestamp: timestamp(1_700_000_000 + block * 12),
            from: draft.from,
            from_label: None,
            to: draft.to,
            to_label: None,
            token_address: draft.token_address,
            token_symbol: draft.token_symbol,
            amount: draft.amount,
            usd_value: None,
        }
    }
}

#[cfg(test)]
pub mod assertions {
    use crate::types::TransferEvent;

    /// Asserts newest-first ordering by `(block_number, log_index)`
    pub fn assert_newest_first(events: &[TransferEvent]) {
        for window in events.windows(2) {
            let a = (window[0].block_number, window[0].log_index);
            let b = (window[1].block_number, window[1].log_index);
            assert!(a >= b, "Events not newest first: {a:?} before {b:?}");
        }
    }
}
