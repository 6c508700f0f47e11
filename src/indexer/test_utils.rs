use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::decoder::abi;
use crate::errors::{IndexerError, Result};
use crate::rpc::{ChainProvider, RawLog};
use crate::types::{Address, BlockNumber};

/// Canned `eth_call` answers for one token. `None` makes that call revert.
#[derive(Debug, Clone, Default)]
struct TokenResponses {
    decimals: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
}

/// Scripted chain for testing purposes.
///
/// Logs are served by block range, so repeated or narrowed queries behave like
/// a real node. Failures are consumed front to back before normal answers resume.
#[doc(hidden)]
pub struct MockChainProvider {
    heads: Mutex<VecDeque<i64>>,
    head_failures: Mutex<usize>,
    logs: Vec<RawLog>,
    log_failures: Mutex<VecDeque<IndexerError>>,
    max_range: Option<i64>,
    log_panics: AtomicUsize,
    tokens: HashMap<String, TokenResponses>,
    timestamps: HashMap<i64, i64>,
    requested_ranges: Mutex<Vec<(i64, i64)>>,
    eth_calls: AtomicUsize,
    call_latency: Option<Duration>,
    calls_in_flight: AtomicUsize,
    max_calls_in_flight: AtomicUsize,
    timestamp_calls: AtomicUsize,
}

impl Default for MockChainProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainProvider {
    pub fn new() -> Self {
        Self {
            heads: Mutex::new(VecDeque::new()),
            head_failures: Mutex::new(0),
            logs: Vec::new(),
            log_failures: Mutex::new(VecDeque::new()),
            max_range: None,
            log_panics: AtomicUsize::new(0),
            tokens: HashMap::new(),
            timestamps: HashMap::new(),
            requested_ranges: Mutex::new(Vec::new()),
            eth_calls: AtomicUsize::new(0),
            call_latency: None,
            calls_in_flight: AtomicUsize::new(0),
            max_calls_in_flight: AtomicUsize::new(0),
            timestamp_calls: AtomicUsize::new(0),
        }
    }

    /// Head stays at `head` until another one is queued.
    pub fn with_head(self, head: i64) -> Self {
        self.with_heads([head])
    }

    /// Heads returned in order; the last one repeats.
    pub fn with_heads(mut self, heads: impl IntoIterator<Item = i64>) -> Self {
        self.heads.get_mut().extend(heads);
        self
    }

    pub fn failing_head(mut self, times: usize) -> Self {
        *self.head_failures.get_mut() = times;
        self
    }

    pub fn with_logs(mut self, logs: impl IntoIterator<Item = RawLog>) -> Self {
        self.logs.extend(logs);
        self
    }

    /// The next `times` log queries fail with a transient error.
    pub fn failing_logs(mut self, times: usize) -> Self {
        let failures = self.log_failures.get_mut();
        for _ in 0..times {
            failures.push_back(IndexerError::rpc_transient("connection reset by peer"));
        }
        self
    }

    /// The next log query fails with `err`.
    pub fn failing_logs_with(mut self, err: IndexerError) -> Self {
        self.log_failures.get_mut().push_back(err);
        self
    }

    /// The next `times` log queries panic, as a buggy task would.
    pub fn panicking_logs(self, times: usize) -> Self {
        self.log_panics.store(times, Ordering::SeqCst);
        self
    }

    /// Log queries spanning more than `max_blocks` are refused.
    pub fn range_limited(mut self, max_blocks: i64) -> Self {
        self.max_range = Some(max_blocks);
        self
    }

    /// Every `eth_call` takes `latency` to answer.
    pub fn slow_calls(mut self, latency: Duration) -> Self {
        self.call_latency = Some(latency);
        self
    }

    pub fn with_token(self, token: &str, symbol: &str, decimals: u8) -> Self {
        self.with_token_calls(token, Some(decimals), Some(symbol), None)
    }

    pub fn with_token_calls(
        mut self,
        token: &str,
        decimals: Option<u8>,
        symbol: Option<&str>,
        name: Option<&str>,
    ) -> Self {
        self.tokens.insert(
            token.to_ascii_lowercase(),
            TokenResponses {
                decimals: decimals.map(|d| abi::encode::uint256(u128::from(d))),
                symbol: symbol.map(abi::encode::string),
                name: name.map(abi::encode::string),
            },
        );
        self
    }

    pub fn with_timestamp(mut self, block: i64, secs: i64) -> Self {
        self.timestamps.insert(block, secs);
        self
    }

    /// Number of `eth_call`s served so far
    pub fn call_count(&self) -> usize {
        self.eth_calls.load(Ordering::SeqCst)
    }

    /// Most `eth_call`s ever outstanding at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_calls_in_flight.load(Ordering::SeqCst)
    }

    pub fn timestamp_call_count(&self) -> usize {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    /// Every `[from, to]` passed to `get_logs`, including refused ones
    pub async fn requested_ranges(&self) -> Vec<(i64, i64)> {
        self.requested_ranges.lock().await.clone()
    }

    fn log_block(log: &RawLog) -> Option<i64> {
        log.block_number
            .as_deref()
            .and_then(|b| BlockNumber::from_hex(b).ok())
            .map(|b| b.value())
    }
}

impl ChainProvider for MockChainProvider {
    async fn get_head_block(&self) -> Result<BlockNumber> {
        {
            let mut failures = self.head_failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(IndexerError::rpc_transient("eth_blockNumber timed out"));
            }
        }

        let mut heads = self.heads.lock().await;
        let head = if heads.len() > 1 {
            heads.pop_front()
        } else {
            heads.front().copied()
        };
        head.map(BlockNumber::from_trusted)
            .ok_or_else(|| IndexerError::rpc_transient("No head configured"))
    }

    async fn get_logs(&self, from: BlockNumber, to: BlockNumber) -> Result<Vec<RawLog>> {
        self.requested_ranges
            .lock()
            .await
            .push((from.value(), to.value()));

        if self
            .log_panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("scripted get_logs panic");
        }
        if let Some(err) = self.log_failures.lock().await.pop_front() {
            return Err(err);
        }
        if let Some(max) = self.max_range {
            if to.value() - from.value() + 1 > max {
                return Err(IndexerError::rpc_range_too_large(format!(
                    "query exceeds max block range {max}"
                )));
            }
        }

        Ok(self
            .logs
            .iter()
            .filter(|log| {
                Self::log_block(log).is_some_and(|b| b >= from.value() && b <= to.value())
            })
            .cloned()
            .collect())
    }

    async fn get_block_timestamp(&self, number: BlockNumber) -> Result<i64> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .timestamps
            .get(&number.value())
            .copied()
            .unwrap_or(1_700_000_000 + number.value() * 12))
    }

    async fn call(&self, to: &Address, data: &str) -> Result<String> {
        self.eth_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.call_latency {
            let in_flight = self.calls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_calls_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            self.calls_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        let responses = self
            .tokens
            .get(to.value())
            .ok_or_else(|| IndexerError::rpc_transient("execution reverted"))?;
        let answer = match data {
            abi::DECIMALS_SELECTOR => responses.decimals.clone(),
            abi::SYMBOL_SELECTOR => responses.symbol.clone(),
            abi::NAME_SELECTOR => responses.name.clone(),
            _ => None,
        };
        answer.ok_or_else(|| IndexerError::rpc_transient("execution reverted"))
    }
}
