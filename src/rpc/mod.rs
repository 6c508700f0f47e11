//! # Chain connection
//!
//! One [`ChainProvider`] per configured chain. It exposes the chain head, Transfer
//! logs for an inclusive block range, block timestamps, and read-only contract
//! calls. Nothing here retries: every method fails fast and the indexer loop
//! owns the backoff policy.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::{
    errors::{IndexerError, Result},
    types::{Address, BlockNumber},
    utils::convert_hex_string_to_i64,
};


/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// A log entry as returned by `eth_getLogs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
    /// Only some providers include this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcRequest<'a, T> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: T,
}

#[derive(Deserialize, Debug)]
struct BlockTimestamp {
    timestamp: String,
}

pub trait ChainProvider {
    /// Most recent block number reported by the node
    fn get_head_block(&self) -> impl Future<Output = Result<BlockNumber>> + Send;

    /// Transfer logs in the inclusive range `[from, to]`
    fn get_logs(
        &self,
        from: BlockNumber,
        to: BlockNumber,
    ) -> impl Future<Output = Result<Vec<RawLog>>> + Send;

    /// Unix timestamp (seconds) of the given block
    fn get_block_timestamp(
        &self,
        number: BlockNumber,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// `eth_call` against the latest state, returning the raw hex result
    fn call(&self, to: &Address, data: &str) -> impl Future<Output = Result<String>> + Send;
}

/// JSON-RPC 2.0 client over HTTP
pub struct JsonRpcChainClient {
    chain: String,
    client: Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcChainClient {
    pub fn new(chain: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let chain = chain.into();
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|e| {
            IndexerError::configuration(format!("{chain}.rpc_url"), format!("'{url}': {e}"))
        })?;

        Ok(Self {
            chain,
            client: Client::new(),
            url,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn make_rpc_call<P: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let raw_response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("[{}] HTTP request error for {}: {:?}", self.chain, method, e);
                IndexerError::from(e)
            })?;

        let status = raw_response.status();
        let text = raw_response.text().await?;
        if !status.is_success() {
            return Err(classify_node_error(
                i64::from(status.as_u16()),
                &format!("HTTP {status}: {text}"),
            ));
        }

        let parsed = serde_json::from_str::<RpcResponse<R>>(&text).map_err(|e| {
            error!(
                "[{}] Deserialization error for {}: {:?}\nResponse snippet: {:?}",
                self.chain,
                method,
                e,
                text.chars().take(512).collect::<String>()
            );
            IndexerError::from(e)
        })?;

        if let Some(err) = parsed.error {
            return Err(classify_node_error(err.code, &err.message));
        }

        parsed
            .result
            .ok_or_else(|| IndexerError::rpc_transient(format!("{method} returned a null result")))
    }
}

/// Maps a node-side error onto the RPC taxonomy.
fn classify_node_error(code: i64, message: &str) -> IndexerError {
    let lowered = message.to_ascii_lowercase();
    let range_hints = [
        "more than",
        "block range",
        "range is too",
        "limit exceeded",
        "too many results",
        "response size",
    ];
    if code == -32005 || range_hints.iter().any(|hint| lowered.contains(hint)) {
        IndexerError::rpc_range_too_large(format!("code {code}: {message}"))
    } else {
        IndexerError::rpc_transient(format!("code {code}: {message}"))
    }
}

impl ChainProvider for JsonRpcChainClient {
    async fn get_head_block(&self) -> Result<BlockNumber> {
        let head: String = self.make_rpc_call("eth_blockNumber", json!([])).await?;
        BlockNumber::from_hex(&head)
    }

    async fn get_logs(&self, from: BlockNumber, to: BlockNumber) -> Result<Vec<RawLog>> {
        let filter = json!([{
            "fromBlock": from.to_hex(),
            "toBlock": to.to_hex(),
            "topics": [TRANSFER_TOPIC],
        }]);
        let entries: Vec<serde_json::Value> = self.make_rpc_call("eth_getLogs", filter).await?;
        let total = entries.len();
        let logs: Vec<RawLog> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<RawLog>(entry) {
                Ok(log) => Some(log),
                Err(e) => {
                    warn!("[{}] Dropping malformed log in {}..={}: {}", self.chain, from, to, e);
                    None
                }
            })
            .collect();
        debug!(
            "[{}] eth_getLogs {}..={} returned {} logs ({} usable)",
            self.chain,
            from,
            to,
            total,
            logs.len()
        );
        Ok(logs)
    }

    async fn get_block_timestamp(&self, number: BlockNumber) -> Result<i64> {
        let block: BlockTimestamp = self
            .make_rpc_call("eth_getBlockByNumber", json!([number.to_hex(), false]))
            .await?;
        convert_hex_string_to_i64(&block.timestamp)
    }

    async fn call(&self, to: &Address, data: &str) -> Result<String> {
        self.make_rpc_call(
            "eth_call",
            json!([{ "to": to.value(), "data": data }, "latest"]),
        )
        .await
    }
}
