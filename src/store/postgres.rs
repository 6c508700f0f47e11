use std::sync::Arc;

use crate::db::DbConnection;
use crate::errors::Result;
use crate::repositories::{checkpoint, transfer_event};
use crate::store::TransferEventFilter;
use crate::types::{BlockNumber, ChainCheckpoint, TransferEvent};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    db: Arc<DbConnection>,
}

impl PostgresStore {
    /// Connects and brings the schema up to date.
    pub async fn connect(db_conn_string: String) -> Result<Self> {
        let db = DbConnection::new(db_conn_string).await?;
        db.migrate().await?;
        Ok(Self { db })
    }

    pub fn from_connection(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    pub async fn disconnect(&self) {
        self.db.close().await;
    }

    pub async fn check_connection(&self) -> Result<()> {
        self.db.check_connection().await
    }

    pub async fn save_transfer_events(&self, events: &[TransferEvent]) -> Result<u64> {
        transfer_event::insert_transfer_events(&self.db.pool, events).await
    }

    pub async fn get_latest_block(&self, chain: &str) -> Result<Option<BlockNumber>> {
        checkpoint::get_latest_block(&self.db.pool, chain).await
    }

    pub async fn update_latest_block(&self, chain: &str, block: BlockNumber) -> Result<()> {
        checkpoint::update_latest_block(&self.db.pool, chain, block).await
    }

    pub async fn get_transfer_events(
        &self,
        filter: &TransferEventFilter,
    ) -> Result<Vec<TransferEvent>> {
        transfer_event::get_transfer_events(&self.db.pool, filter).await
    }

    pub async fn get_checkpoints(&self) -> Result<Vec<ChainCheckpoint>> {
        checkpoint::get_checkpoints(&self.db.pool).await
    }
}
