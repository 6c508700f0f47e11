use std::collections::HashMap;

use dashmap::DashMap;
use serde::Serialize;

use crate::types::BlockNumber;

/// Where a chain's indexing loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Initializing,
    CatchingUp,
    IdlePoll,
    ErrorBackoff,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    pub latest_checkpoint: Option<BlockNumber>,
    /// Whether the last head-block call succeeded
    pub connected: bool,
    pub state: ChainState,
}

impl Default for ChainStatus {
    fn default() -> Self {
        Self {
            latest_checkpoint: None,
            connected: false,
            state: ChainState::Initializing,
        }
    }
}

/// Live per-chain status, written by chain tasks and read by `get_status`.
#[derive(Debug, Default)]
pub struct StatusBoard {
    chains: DashMap<String, ChainStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, chain: &str, f: impl FnOnce(&mut ChainStatus)) {
        let mut status = self.chains.entry(chain.to_string()).or_default();
        f(status.value_mut());
    }

    pub fn register(&self, chain: &str) {
        self.update(chain, |_| {});
    }

    pub fn set_state(&self, chain: &str, state: ChainState) {
        self.update(chain, |status| status.state = state);
    }

    pub fn set_connected(&self, chain: &str, connected: bool) {
        self.update(chain, |status| status.connected = connected);
    }

    pub fn set_checkpoint(&self, chain: &str, block: BlockNumber) {
        self.update(chain, |status| {
            status.latest_checkpoint = Some(status.latest_checkpoint.map_or(block, |b| b.max(block)));
        });
    }

    pub fn get(&self, chain: &str) -> Option<ChainStatus> {
        self.chains.get(chain).map(|status| status.value().clone())
    }

    pub fn snapshot(&self) -> HashMap<String, ChainStatus> {
        self.chains
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
