//! # Persistence
//!
//! [`Store`] is the single persistence handle shared by every chain task. It is
//! a closed set of backends: Postgres for deployments and an in-memory map for
//! tests and dry runs. Both honour the same contract:
//!
//! - saving a batch is idempotent on `(chain, tx_hash, log_index)`
//! - a chain checkpoint never moves backwards
//! - reads are newest first and capped at [`MAX_QUERY_LIMIT`] rows

mod memory;
mod postgres;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{IndexerError, Result};
use crate::types::{Address, BlockNumber, ChainCheckpoint, TransferEvent};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub const DEFAULT_QUERY_LIMIT: i64 = 100;
pub const MAX_QUERY_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(IndexerError::configuration(
                "store_backend",
                format!("Unknown store backend '{other}', expected postgres or memory"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub db_conn_string: Option<String>,
}

impl StoreConfig {
    #[must_use]
    pub const fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            db_conn_string: None,
        }
    }

    pub fn postgres(db_conn_string: impl Into<String>) -> Self {
        Self {
            backend: StoreBackend::Postgres,
            db_conn_string: Some(db_conn_string.into()),
        }
    }
}

/// Criteria for [`Store::get_transfer_events`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEventFilter {
    pub chain: Option<String>,
    pub token_address: Option<Address>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub from_block: Option<BlockNumber>,
    pub to_block: Option<BlockNumber>,
    pub limit: Option<i64>,
}

impl TransferEventFilter {
    pub fn for_chain(chain: impl Into<String>) -> Self {
        Self {
            chain: Some(chain.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested limit, defaulted and clamped to `1..=MAX_QUERY_LIMIT`
    #[must_use]
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }

    #[must_use]
    pub fn matches(&self, event: &TransferEvent) -> bool {
        self.chain.as_ref().map_or(true, |c| *c == event.chain)
            && self
                .token_address
                .as_ref()
                .map_or(true, |t| *t == event.token_address)
            && self.from.as_ref().map_or(true, |f| *f == event.from)
            && self.to.as_ref().map_or(true, |t| *t == event.to)
            && self.from_block.map_or(true, |b| event.block_number >= b)
            && self.to_block.map_or(true, |b| event.block_number <= b)
    }
}

#[derive(Debug)]
pub enum Store {
    Postgres(PostgresStore),
    Memory(MemoryStore),
}

impl Store {
    /// Opens the configured backend. For Postgres this also runs migrations.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        match config.backend {
            StoreBackend::Memory => {
                info!("[store] Using in-memory store");
                Ok(Self::Memory(MemoryStore::new()))
            }
            StoreBackend::Postgres => {
                let conn_string = config.db_conn_string.clone().ok_or_else(|| {
                    IndexerError::configuration(
                        "db_conn_string",
                        "Database connection string is required for the postgres store",
                    )
                })?;
                info!("[store] Connecting to Postgres");
                Ok(Self::Postgres(PostgresStore::connect(conn_string).await?))
            }
        }
    }

    pub async fn disconnect(&self) {
        match self {
            Self::Postgres(store) => store.disconnect().await,
            Self::Memory(store) => store.disconnect(),
        }
    }

    pub async fn check_connection(&self) -> Result<()> {
        match self {
            Self::Postgres(store) => store.check_connection().await,
            Self::Memory(store) => store.check_connection(),
        }
    }

    /// Persists a batch atomically and returns the number of new rows.
    /// Rows already present are left untouched.
    pub async fn save_transfer_events(&self, events: &[TransferEvent]) -> Result<u64> {
        match self {
            Self::Postgres(store) => store.save_transfer_events(events).await,
            Self::Memory(store) => store.save_transfer_events(events).await,
        }
    }

    pub async fn get_latest_block(&self, chain: &str) -> Result<Option<BlockNumber>> {
        match self {
            Self::Postgres(store) => store.get_latest_block(chain).await,
            Self::Memory(store) => store.get_latest_block(chain).await,
        }
    }

    /// Advances the checkpoint; a lower `block` than the stored one is a no-op.
    pub async fn update_latest_block(&self, chain: &str, block: BlockNumber) -> Result<()> {
        match self {
            Self::Postgres(store) => store.update_latest_block(chain, block).await,
            Self::Memory(store) => store.update_latest_block(chain, block).await,
        }
    }

    pub async fn get_transfer_events(
        &self,
        filter: &TransferEventFilter,
    ) -> Result<Vec<TransferEvent>> {
        match self {
            Self::Postgres(store) => store.get_transfer_events(filter).await,
            Self::Memory(store) => store.get_transfer_events(filter).await,
        }
    }

    pub async fn get_checkpoints(&self) -> Result<Vec<ChainCheckpoint>> {
        match self {
            Self::Postgres(store) => store.get_checkpoints().await,
            Self::Memory(store) => store.get_checkpoints().await,
        }
    }
}
