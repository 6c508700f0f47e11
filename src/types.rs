use crate::errors::{IndexerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// A blockchain block number with validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(i64);

impl BlockNumber {
    /// Creates a new `BlockNumber` with validation
    pub fn new(value: i64) -> Result<Self> {
        if value < 0 {
            return Err(IndexerError::rpc_data(
                "block_number",
                format!("Block number cannot be negative: {value}"),
            ));
        }
        Ok(Self(value))
    }

    /// Creates a `BlockNumber` without validation (for trusted sources)
    #[must_use]
    pub const fn from_trusted(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Creates a `BlockNumber` from a hex quantity such as `0x1a`
    pub fn from_hex(hex: &str) -> Result<Self> {
        let cleaned = hex.strip_prefix("0x").unwrap_or(hex);
        let value = i64::from_str_radix(cleaned, 16).map_err(|e| {
            IndexerError::rpc_data(
                "block_number",
                format!("Invalid hex block number '{hex}': {e}"),
            )
        })?;
        Self::new(value)
    }

    /// Hex quantity encoding used in JSON-RPC params
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.0)
    }

    /// Saturating subtraction that never goes below block zero
    #[must_use]
    pub fn saturating_sub(self, other: i64) -> Self {
        Self(self.0.saturating_sub(other).max(0))
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BlockNumber> for i64 {
    fn from(block_number: BlockNumber) -> Self {
        block_number.0
    }
}

impl FromStr for BlockNumber {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.parse::<i64>().map_err(|e| {
            IndexerError::rpc_data("block_number", format!("Invalid block number '{s}': {e}"))
        })?;
        Self::new(value)
    }
}

impl Add<i64> for BlockNumber {
    type Output = Self;

    fn add(self, other: i64) -> Self {
        Self::from_trusted(self.0 + other)
    }
}

impl Sub<i64> for BlockNumber {
    type Output = Self;

    fn sub(self, other: i64) -> Self {
        Self::from_trusted(self.0 - other)
    }
}

fn validate_hex(value: &str, field_name: &str, expected_len: usize) -> Result<String> {
    let cleaned = value.strip_prefix("0x").unwrap_or(value);

    if cleaned.len() != expected_len {
        return Err(IndexerError::rpc_data(
            field_name,
            format!(
                "Expected {expected_len} hex characters (got {}): {value}",
                cleaned.len()
            ),
        ));
    }

    if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IndexerError::rpc_data(
            field_name,
            format!("Contains non-hex characters: {value}"),
        ));
    }

    Ok(format!("0x{}", cleaned.to_ascii_lowercase()))
}

/// A transaction hash, normalised to lowercase with a `0x` prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionHash(String);

impl TransactionHash {
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        validate_hex(value.as_ref(), "transaction_hash", 64).map(Self)
    }

    #[must_use]
    pub const fn from_trusted(value: String) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TransactionHash> for String {
    fn from(transaction_hash: TransactionHash) -> Self {
        transaction_hash.0
    }
}

impl FromStr for TransactionHash {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// An EVM address, normalised to lowercase with a `0x` prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        validate_hex(value.as_ref(), "address", 40).map(Self)
    }

    #[must_use]
    pub const fn from_trusted(value: String) -> Self {
        Self(value)
    }

    /// Extracts the address from a 32-byte left-padded topic word
    pub fn from_topic(topic: &str) -> Result<Self> {
        let word = validate_hex(topic, "topic", 64)?;
        let (padding, address) = word[2..].split_at(24);
        if padding.chars().any(|c| c != '0') {
            return Err(IndexerError::rpc_data(
                "topic",
                format!("Topic is not a padded address: {topic}"),
            ));
        }
        Ok(Self(format!("0x{address}")))
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0[2..].chars().all(|c| c == '0')
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Static ERC-20 token facts resolved through `eth_call`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelCategory {
    Dex,
    Vault,
    Bridge,
    Wallet,
    Other,
}

impl LabelCategory {
    /// Best-effort category for a verified contract name
    #[must_use]
    pub fn infer_from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if ["router", "swap", "pair", "pool", "exchange"]
            .iter()
            .any(|k| name.contains(k))
        {
            Self::Dex
        } else if name.contains("vault") {
            Self::Vault
        } else if name.contains("bridge") || name.contains("portal") {
            Self::Bridge
        } else {
            Self::Other
        }
    }
}

/// A human-readable name for an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLabel {
    pub address: Address,
    pub label: String,
    pub category: LabelCategory,
}

/// Last fully processed block for a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    pub chain: String,
    pub latest_block: BlockNumber,
    pub updated_at: DateTime<Utc>,
}

/// A decoded transfer that has not been enriched yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDraft {
    pub chain: String,
    pub tx_hash: TransactionHash,
    pub log_index: i64,
    pub block_number: BlockNumber,
    /// Present when the node returns `blockTimestamp` alongside the log
    pub timestamp: Option<DateTime<Utc>>,
    pub from: Address,
    pub to: Address,
    pub token_address: Address,
    pub token_symbol: String,
    pub amount: Decimal,
}

/// A persisted, enriched ERC-20 transfer. Unique on `(chain, tx_hash, log_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub chain: String,
    pub tx_hash: TransactionHash,
    pub log_index: i64,
    pub block_number: BlockNumber,
    pub timestamp: DateTime<Utc>,
    pub from: Address,
    pub from_label: Option<String>,
    pub to: Address,
    pub to_label: Option<String>,
    pub token_address: Address,
    pub token_symbol: String,
    pub amount: Decimal,
    pub usd_value: Option<Decimal>,
}

impl TransferEvent {
    #[must_use]
    pub fn key(&self) -> (String, TransactionHash, i64) {
        (self.chain.clone(), self.tx_hash.clone(), self.log_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_number_valid() {
        let bn = BlockNumber::new(12345).unwrap();
        assert_eq!(bn.value(), 12345);
    }

    #[test]
    fn test_block_number_negative() {
        assert!(BlockNumber::new(-1).is_err());
    }

    #[test]
    fn test_block_number_hex_round_trip() {
        let bn = BlockNumber::from_hex("0x1a").unwrap();
        assert_eq!(bn.value(), 26);
        assert_eq!(bn.to_hex(), "0x1a");
    }

    #[test]
    fn test_block_number_saturating_sub() {
        assert_eq!(BlockNumber::from_trusted(5).saturating_sub(10).value(), 0);
        assert_eq!(BlockNumber::from_trusted(50).saturating_sub(10).value(), 40);
    }

    #[test]
    fn test_transaction_hash_normalised() {
        let hash = "0x1234567890ABCDEF1234567890abcdef1234567890abcdef1234567890ABCDEF";
        let th = TransactionHash::new(hash).unwrap();
        assert_eq!(th.value(), hash.to_ascii_lowercase());
    }

    #[test]
    fn test_address_without_prefix_gets_prefixed() {
        let address = Address::new("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        assert_eq!(address.value(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    }

    #[test]
    fn test_address_invalid_length() {
        assert!(Address::new("0x1234").is_err());
    }

    #[test]
    fn test_address_from_topic() {
        let topic = "0x000000000000000000000000a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
        let address = Address::from_topic(topic).unwrap();
        assert_eq!(address.value(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    }

    #[test]
    fn test_address_from_topic_rejects_dirty_padding() {
        let topic = "0x100000000000000000000000a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
        assert!(Address::from_topic(topic).is_err());
    }

    #[test]
    fn test_zero_address() {
        let zero = Address::new("0x0000000000000000000000000000000000000000").unwrap();
        assert!(zero.is_zero());
    }

    #[test]
    fn test_label_category_inference() {
        assert_eq!(
            LabelCategory::infer_from_name("UniswapV2Router02"),
            LabelCategory::Dex
        );
        assert_eq!(
            LabelCategory::infer_from_name("BalancerVault"),
            LabelCategory::Vault
        );
        assert_eq!(
            LabelCategory::infer_from_name("L1StandardBridge"),
            LabelCategory::Bridge
        );
        assert_eq!(
            LabelCategory::infer_from_name("GnosisSafeProxy"),
            LabelCategory::Other
        );
    }
}
