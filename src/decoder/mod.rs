//! # Transfer decoding
//!
//! Turns raw `eth_getLogs` entries into [`TransferDraft`]s. A log that cannot be
//! decoded is dropped and logged; it never fails the batch it arrived in.

pub mod abi;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::{
    cache::TokenMetadataCache,
    errors::{IndexerError, Result},
    rpc::{ChainProvider, RawLog, TRANSFER_TOPIC},
    types::{Address, BlockNumber, TokenMetadata, TransactionHash, TransferDraft},
    utils::convert_hex_string_to_i64,
};

/// Upper bound on logs decoded concurrently, which bounds concurrent `eth_call`s.
pub const DECODE_CHUNK_SIZE: usize = 10;
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";
pub const DEFAULT_DECIMALS: u8 = 18;

/// The structural part of a Transfer log, before token metadata is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransferLog {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: alloy_primitives::U256,
    pub block_number: BlockNumber,
    pub tx_hash: TransactionHash,
    pub log_index: i64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Validates the shape of a Transfer log and extracts its fields.
pub fn parse_transfer_log(log: &RawLog) -> Result<ParsedTransferLog> {
    if log.removed {
        return Err(IndexerError::rpc_data("removed", "Log was removed by a reorg"));
    }

    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| IndexerError::rpc_data("topics", "Log has no topics"))?;
    if !topic0.eq_ignore_ascii_case(TRANSFER_TOPIC) {
        return Err(IndexerError::rpc_data(
            "topics",
            format!("Unexpected event signature {topic0}"),
        ));
    }
    // ERC-721 shares the signature but indexes the token id as a fourth topic.
    if log.topics.len() != 3 {
        return Err(IndexerError::rpc_data(
            "topics",
            format!("Expected 3 topics, got {}", log.topics.len()),
        ));
    }

    let value = abi::decode_uint256(&log.data)
        .ok_or_else(|| IndexerError::rpc_data("data", format!("Bad value word '{}'", log.data)))?;

    let block_number = log
        .block_number
        .as_deref()
        .ok_or_else(|| IndexerError::rpc_data("blockNumber", "Missing (pending log?)"))
        .and_then(BlockNumber::from_hex)?;
    let tx_hash = log
        .transaction_hash
        .as_deref()
        .ok_or_else(|| IndexerError::rpc_data("transactionHash", "Missing"))
        .and_then(TransactionHash::new)?;
    let log_index = log
        .log_index
        .as_deref()
        .ok_or_else(|| IndexerError::rpc_data("logIndex", "Missing"))
        .and_then(convert_hex_string_to_i64)?;

    let timestamp = log
        .block_timestamp
        .as_deref()
        .and_then(|ts| convert_hex_string_to_i64(ts).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Ok(ParsedTransferLog {
        token: Address::new(&log.address)?,
        from: Address::from_topic(&log.topics[1])?,
        to: Address::from_topic(&log.topics[2])?,
        value,
        block_number,
        tx_hash,
        log_index,
        timestamp,
    })
}

pub struct TransferDecoder<C> {
    chain: String,
    provider: Arc<C>,
    metadata_cache: Arc<TokenMetadataCache>,
}

impl<C> Clone for TransferDecoder<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            provider: self.provider.clone(),
            metadata_cache: self.metadata_cache.clone(),
        }
    }
}

impl<C> TransferDecoder<C>
where
    C: ChainProvider + Send + Sync,
{
    pub fn new(
        chain: impl Into<String>,
        provider: Arc<C>,
        metadata_cache: Arc<TokenMetadataCache>,
    ) -> Self {
        Self {
            chain: chain.into(),
            provider,
            metadata_cache,
        }
    }

    /// Decodes one log, or drops it with a warning.
    pub async fn decode_transfer_log(&self, log: &RawLog) -> Option<TransferDraft> {
        match self.try_decode(log).await {
            Ok(draft) => Some(draft),
            Err(e) => {
                warn!(
                    "[{}] Dropping log tx={} index={}: {}",
                    self.chain,
                    log.transaction_hash.as_deref().unwrap_or("?"),
                    log.log_index.as_deref().unwrap_or("?"),
                    e
                );
                None
            }
        }
    }

    /// Decodes logs in chunks of [`DECODE_CHUNK_SIZE`], preserving input order.
    pub async fn decode_batch(&self, logs: &[RawLog]) -> Vec<TransferDraft> {
        let mut drafts = Vec::with_capacity(logs.len());
        for chunk in logs.chunks(DECODE_CHUNK_SIZE) {
            let decoded = join_all(chunk.iter().map(|log| self.decode_transfer_log(log))).await;
            drafts.extend(decoded.into_iter().flatten());
        }

        if drafts.len() < logs.len() {
            debug!(
                "[{}] Decoded {} of {} logs",
                self.chain,
                drafts.len(),
                logs.len()
            );
        }
        drafts
    }

    async fn try_decode(&self, log: &RawLog) -> Result<TransferDraft> {
        let parsed = parse_transfer_log(log)?;
        let metadata = self.resolve_token_metadata(&parsed.token).await?;
        let amount = abi::scale_amount(parsed.value, metadata.decimals).ok_or_else(|| {
            IndexerError::rpc_data(
                "data",
                format!(
                    "Value {} with {} decimals overflows",
                    parsed.value, metadata.decimals
                ),
            )
        })?;

        Ok(TransferDraft {
            chain: self.chain.clone(),
            tx_hash: parsed.tx_hash,
            log_index: parsed.log_index,
            block_number: parsed.block_number,
            timestamp: parsed.timestamp,
            from: parsed.from,
            to: parsed.to,
            token_address: parsed.token,
            token_symbol: metadata.symbol,
            amount,
        })
    }

    /// Cached metadata, else `decimals()`, `symbol()` and `name()` over
    /// `eth_call`. Missing fields fall back to defaults; only a token that
    /// answers none of the three calls is an error.
    pub async fn resolve_token_metadata(&self, token: &Address) -> Result<TokenMetadata> {
        let key = (self.chain.clone(), token.clone());
        if let Some(metadata) = self.metadata_cache.get(&key) {
            return Ok(metadata);
        }

        let (decimals, symbol, name) = futures::join!(
            self.provider.call(token, abi::DECIMALS_SELECTOR),
            self.provider.call(token, abi::SYMBOL_SELECTOR),
            self.provider.call(token, abi::NAME_SELECTOR),
        );

        let decimals = decimals
            .ok()
            .as_deref()
            .and_then(abi::decode_uint256)
            .and_then(|d| u8::try_from(d).ok());
        let symbol = symbol.ok().as_deref().and_then(abi::decode_string);
        let name = name.ok().as_deref().and_then(abi::decode_string);

        if decimals.is_none() && symbol.is_none() && name.is_none() {
            return Err(IndexerError::rpc_data(
                "token_metadata",
                format!("{token} answered none of decimals/symbol/name"),
            ));
        }

        let metadata = TokenMetadata {
            address: token.clone(),
            symbol: symbol.unwrap_or_else(|| UNKNOWN_SYMBOL.to_string()),
            decimals: decimals.unwrap_or(DEFAULT_DECIMALS),
            name,
        };
        debug!(
            "[{}] Resolved token {} as {} ({} decimals)",
            self.chain, token, metadata.symbol, metadata.decimals
        );
        self.metadata_cache.insert(key, metadata.clone());
        Ok(metadata)
    }
}
