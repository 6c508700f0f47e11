use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::errors::{IndexerError, Result};
use crate::store::TransferEventFilter;
use crate::types::{BlockNumber, ChainCheckpoint, TransactionHash, TransferEvent};

type EventKey = (String, TransactionHash, i64);

#[derive(Debug, Default)]
struct MemoryState {
    events: BTreeMap<EventKey, TransferEvent>,
    checkpoints: HashMap<String, ChainCheckpoint>,
}

/// Process-local store. Everything is lost on restart.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    connected: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            connected: AtomicBool::new(true),
        }
    }

    /// Subsequent operations fail with a persistence error.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn check_connection(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IndexerError::persistence("connect", "Memory store is disconnected"))
        }
    }

    pub async fn save_transfer_events(&self, events: &[TransferEvent]) -> Result<u64> {
        self.check_connection()?;
        let mut state = self.state.write().await;
        let mut inserted = 0;
        for event in events {
            if let std::collections::btree_map::Entry::Vacant(slot) = state.events.entry(event.key()) {
                slot.insert(event.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    pub async fn get_latest_block(&self, chain: &str) -> Result<Option<BlockNumber>> {
        self.check_connection()?;
        let state = self.state.read().await;
        Ok(state.checkpoints.get(chain).map(|c| c.latest_block))
    }

    pub async fn update_latest_block(&self, chain: &str, block: BlockNumber) -> Result<()> {
        self.check_connection()?;
        let mut state = self.state.write().await;
        let checkpoint = state
            .checkpoints
            .entry(chain.to_string())
            .or_insert_with(|| ChainCheckpoint {
                chain: chain.to_string(),
                latest_block: block,
                updated_at: Utc::now(),
            });
        checkpoint.latest_block = checkpoint.latest_block.max(block);
        checkpoint.updated_at = Utc::now();
        Ok(())
    }

    pub async fn get_transfer_events(
        &self,
        filter: &TransferEventFilter,
    ) -> Result<Vec<TransferEvent>> {
        self.check_connection()?;
        let state = self.state.read().await;
        let mut events: Vec<TransferEvent> = state
            .events
            .values()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();

        events.sort_by(|a, b| {
            (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index))
        });
        events.truncate(usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX));
        Ok(events)
    }

    pub async fn get_checkpoints(&self) -> Result<Vec<ChainCheckpoint>> {
        self.check_connection()?;
        let state = self.state.read().await;
        let mut checkpoints: Vec<ChainCheckpoint> = state.checkpoints.values().cloned().collect();
        checkpoints.sort_by(|a, b| a.chain.cmp(&b.chain));
        Ok(checkpoints)
    }
}
