//! # Indexing Services
//!
//! One long-running task per chain, each driving the same state machine:
//!
//! ```text
//! Initializing -> CatchingUp <-> IdlePoll
//!                      |            |
//!                      v            v
//!                  ErrorBackoff ----+
//!                      |
//!                   Stopped   (cancellation from any state)
//! ```
//!
//! - [`chain_service`]: the per-chain loop. It fetches a block window, decodes
//!   and enriches the transfers, persists them, then advances the checkpoint.
//! - [`status`]: live per-chain status shared with readers.
//! - [`lib`]: the orchestrator that supervises chain tasks, plus
//!   [`lib::start_indexing_services`], the entry point used by the binary.
//!
//! ```rust,no_run
//! use transfer_indexer::config::{ChainConfig, IndexingConfig};
//! use transfer_indexer::indexer::lib::start_indexing_services;
//! use transfer_indexer::store::StoreConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> transfer_indexer::Result<()> {
//! let config = IndexingConfig::builder()
//!     .chain(ChainConfig::new("ethereum", "http://localhost:8545"))
//!     .store(StoreConfig::memory())
//!     .build()?;
//!
//! start_indexing_services(config, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod chain_service;
pub mod lib;
pub mod status;

#[cfg(test)]
pub mod test_utils;
