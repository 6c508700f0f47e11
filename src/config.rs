use std::time::Duration;

use crate::enrichment::labels::{LabelSeed, DEFAULT_LABEL_CHUNK_DELAY};
use crate::enrichment::prices::{DEFAULT_PRICE_API_URL, DEFAULT_PRICE_CHUNK_DELAY};
use crate::errors::{IndexerError, Result};
use crate::store::StoreConfig;

pub const DEFAULT_BATCH_SIZE: u32 = 100;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(12_000);
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(30_000);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);
/// Blocks behind head a chain without a configured start block begins at
pub const DEFAULT_START_BLOCK_OFFSET: u64 = 10;

/// One independently indexed chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: String,
    pub start_block: Option<i64>,
    pub explorer_api_url: Option<String>,
    pub explorer_api_key: Option<String>,
}

impl ChainConfig {
    pub fn new(name: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpc_url: rpc_url.into(),
            start_block: None,
            explorer_api_url: None,
            explorer_api_key: None,
        }
    }

    #[must_use]
    pub const fn with_start_block(mut self, start_block: i64) -> Self {
        self.start_block = Some(start_block);
        self
    }

    #[must_use]
    pub fn with_explorer(mut self, api_url: impl Into<String>, api_key: Option<String>) -> Self {
        self.explorer_api_url = Some(api_url.into());
        self.explorer_api_key = api_key;
        self
    }

    /// Checks this chain on its own; a failure disables only this chain.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(IndexerError::configuration(
                "chain.name",
                format!("'{}' must be non-empty lowercase [a-z0-9_-]", self.name),
            ));
        }

        validate_http_url(&format!("{}.rpc_url", self.name), &self.rpc_url)?;

        if let Some(start_block) = self.start_block {
            if start_block < 0 {
                return Err(IndexerError::configuration(
                    format!("{}.start_block", self.name),
                    format!("Start block cannot be negative: {start_block}"),
                ));
            }
        }

        if let Some(url) = &self.explorer_api_url {
            validate_http_url(&format!("{}.explorer_api_url", self.name), url)?;
        }

        Ok(())
    }
}

fn validate_http_url(parameter: &str, url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| IndexerError::configuration(parameter, format!("'{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(IndexerError::configuration(
            parameter,
            format!("'{url}' must be an http(s) URL"),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct IndexingConfig {
    pub chains: Vec<ChainConfig>,
    pub store: StoreConfig,
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub rpc_timeout: Duration,
    pub start_block_offset: u64,
    pub price_api_url: String,
    pub price_api_key: Option<String>,
    pub label_seeds: Vec<LabelSeed>,
    pub label_chunk_delay: Duration,
    pub price_chunk_delay: Duration,
    /// Address for the health router; `None` disables it
    pub router_endpoint: Option<String>,
}

impl IndexingConfig {
    #[must_use]
    pub const fn builder() -> IndexingConfigBuilder {
        IndexingConfigBuilder::new()
    }
}

pub struct IndexingConfigBuilder {
    chains: Vec<ChainConfig>,
    store: Option<StoreConfig>,
    batch_size: u32,
    poll_interval: Duration,
    error_backoff: Duration,
    rpc_timeout: Duration,
    start_block_offset: u64,
    price_api_url: Option<String>,
    price_api_key: Option<String>,
    label_seeds: Vec<LabelSeed>,
    label_chunk_delay: Duration,
    price_chunk_delay: Duration,
    router_endpoint: Option<String>,
}

impl IndexingConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chains: Vec::new(),
            store: None,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            start_block_offset: DEFAULT_START_BLOCK_OFFSET,
            price_api_url: None,
            price_api_key: None,
            label_seeds: Vec::new(),
            label_chunk_delay: DEFAULT_LABEL_CHUNK_DELAY,
            price_chunk_delay: DEFAULT_PRICE_CHUNK_DELAY,
            router_endpoint: None,
        }
    }

    #[must_use]
    pub const fn development() -> Self {
        Self::new()
            .batch_size(50)
            .poll_interval(Duration::from_secs(5))
            .error_backoff(Duration::from_secs(5))
    }

    /// Short timers and no rate-limit pauses; pair with the memory store.
    #[must_use]
    pub const fn testing() -> Self {
        Self::new()
            .batch_size(10)
            .poll_interval(Duration::from_millis(100))
            .error_backoff(Duration::from_millis(100))
            .rpc_timeout(Duration::from_secs(5))
            .label_chunk_delay(Duration::ZERO)
            .price_chunk_delay(Duration::ZERO)
    }

    #[must_use]
    pub const fn production() -> Self {
        Self::new()
    }

    #[must_use]
    pub fn chain(mut self, chain: ChainConfig) -> Self {
        self.chains.push(chain);
        self
    }

    #[must_use]
    pub fn chains(mut self, chains: impl IntoIterator<Item = ChainConfig>) -> Self {
        self.chains.extend(chains);
        self
    }

    #[must_use]
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub const fn error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    #[must_use]
    pub const fn rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    #[must_use]
    pub const fn start_block_offset(mut self, start_block_offset: u64) -> Self {
        self.start_block_offset = start_block_offset;
        self
    }

    #[must_use]
    pub fn price_api<S: Into<String>>(mut self, url: S, api_key: Option<String>) -> Self {
        self.price_api_url = Some(url.into());
        self.price_api_key = api_key;
        self
    }

    #[must_use]
    pub fn label_seeds(mut self, seeds: impl IntoIterator<Item = LabelSeed>) -> Self {
        self.label_seeds.extend(seeds);
        self
    }

    #[must_use]
    pub const fn label_chunk_delay(mut self, delay: Duration) -> Self {
        self.label_chunk_delay = delay;
        self
    }

    #[must_use]
    pub const fn price_chunk_delay(mut self, delay: Duration) -> Self {
        self.price_chunk_delay = delay;
        self
    }

    #[must_use]
    pub fn router_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.router_endpoint = Some(endpoint.into());
        self
    }

    /// Validates the global settings. Individual chains are validated when
    /// the orchestrator starts them so one bad chain cannot stop the others.
    pub fn build(self) -> Result<IndexingConfig> {
        let store = self.store.ok_or_else(|| {
            IndexerError::configuration("store", "A store backend must be configured")
        })?;

        if self.chains.is_empty() {
            return Err(IndexerError::configuration(
                "chains",
                "At least one chain must be configured",
            ));
        }

        if self.batch_size == 0 {
            return Err(IndexerError::configuration(
                "batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(IndexerError::configuration(
                "poll_interval",
                "Poll interval must be greater than 0",
            ));
        }

        if self.error_backoff.is_zero() {
            return Err(IndexerError::configuration(
                "error_backoff",
                "Error backoff must be greater than 0",
            ));
        }

        if self.rpc_timeout.is_zero() {
            return Err(IndexerError::configuration(
                "rpc_timeout",
                "RPC timeout must be greater than 0",
            ));
        }

        let price_api_url = self
            .price_api_url
            .unwrap_or_else(|| DEFAULT_PRICE_API_URL.to_string());
        validate_http_url("price_api_url", &price_api_url)?;

        Ok(IndexingConfig {
            chains: self.chains,
            store,
            batch_size: self.batch_size,
            poll_interval: self.poll_interval,
            error_backoff: self.error_backoff,
            rpc_timeout: self.rpc_timeout,
            start_block_offset: self.start_block_offset,
            price_api_url,
            price_api_key: self.price_api_key,
            label_seeds: self.label_seeds,
            label_chunk_delay: self.label_chunk_delay,
            price_chunk_delay: self.price_chunk_delay,
            router_endpoint: self.router_endpoint,
        })
    }
}

impl Default for IndexingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
