use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cache::TokenMetadataCache,
    config::{ChainConfig, IndexingConfig},
    decoder::TransferDecoder,
    enrichment::{AddressLabeler, PriceResolver},
    errors::{IndexerError, Result},
    indexer::status::{ChainState, StatusBoard},
    rpc::ChainProvider,
    store::Store,
    types::{Address, BlockNumber, TransferDraft, TransferEvent},
};

/// Distinct blocks whose timestamps are fetched concurrently
const TIMESTAMP_CHUNK_SIZE: usize = 10;

/// Per-chain loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainIndexConfig {
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub start_block: Option<i64>,
    pub start_block_offset: u64,
}

impl ChainIndexConfig {
    pub fn from_config(config: &IndexingConfig, chain: &ChainConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            poll_interval: config.poll_interval,
            error_backoff: config.error_backoff,
            start_block: chain.start_block,
            start_block_offset: config.start_block_offset,
        }
    }
}

/// Components shared by every chain task
#[derive(Clone)]
pub struct SharedServices {
    pub store: Arc<Store>,
    pub labeler: Arc<AddressLabeler>,
    pub prices: Arc<PriceResolver>,
    pub metadata_cache: Arc<TokenMetadataCache>,
    pub status: Arc<StatusBoard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A window was indexed and the checkpoint moved to `to`
    Indexed {
        from: BlockNumber,
        to: BlockNumber,
        saved: u64,
    },
    /// Already at head
    Idle { head: BlockNumber },
}

/// First block still to be indexed.
///
/// With a checkpoint this is the block after it. Without one it is the
/// configured start block, else `head - offset` floored at zero.
pub fn resume_point(
    checkpoint: Option<BlockNumber>,
    start_block: Option<i64>,
    head: BlockNumber,
    start_block_offset: u64,
) -> BlockNumber {
    match (checkpoint, start_block) {
        (Some(checkpoint), _) => checkpoint + 1,
        (None, Some(start_block)) => BlockNumber::from_trusted(start_block.max(0)),
        (None, None) => {
            head.saturating_sub(i64::try_from(start_block_offset).unwrap_or(i64::MAX))
        }
    }
}

/// Inclusive `[resume, min(resume + batch_size - 1, head)]`, or `None` when
/// there is nothing new.
pub fn next_batch_window(
    resume: BlockNumber,
    head: BlockNumber,
    batch_size: u32,
) -> Option<(BlockNumber, BlockNumber)> {
    if resume > head {
        return None;
    }
    let batch_end = resume + (i64::from(batch_size.max(1)) - 1);
    Some((resume, batch_end.min(head)))
}

/// USD value of `amount` at `price`, or `None` when it cannot be represented.
pub fn usd_value(amount: Decimal, price: f64) -> Option<Decimal> {
    let price = Decimal::try_from(price).ok()?;
    amount.checked_mul(price).map(|v| v.normalize())
}

/// Indexes one chain: fetch, decode, enrich, persist, checkpoint.
pub struct ChainIndexer<C> {
    chain: String,
    provider: Arc<C>,
    decoder: TransferDecoder<C>,
    config: ChainIndexConfig,
    services: SharedServices,
    cancel: CancellationToken,
    effective_batch_size: u32,
}

impl<C> Clone for ChainIndexer<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            provider: self.provider.clone(),
            decoder: self.decoder.clone(),
            config: self.config.clone(),
            services: self.services.clone(),
            cancel: self.cancel.clone(),
            effective_batch_size: self.config.batch_size,
        }
    }
}

impl<C> ChainIndexer<C>
where
    C: ChainProvider + Send + Sync + 'static,
{
    pub fn new(
        chain: impl Into<String>,
        provider: Arc<C>,
        config: ChainIndexConfig,
        services: SharedServices,
        cancel: CancellationToken,
    ) -> Self {
        let chain = chain.into();
        let decoder = TransferDecoder::new(
            chain.clone(),
            provider.clone(),
            services.metadata_cache.clone(),
        );
        services.status.register(&chain);

        Self {
            effective_batch_size: config.batch_size,
            chain,
            provider,
            decoder,
            config,
            services,
            cancel,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub const fn effective_batch_size(&self) -> u32 {
        self.effective_batch_size
    }

    fn set_state(&self, state: ChainState) {
        self.services.status.set_state(&self.chain, state);
    }

    /// Runs until the cancellation token fires or a non-retryable error stops the chain.
    pub async fn run(&mut self) {
        info!("[{}] Starting indexer", self.chain);
        self.set_state(ChainState::Initializing);

        while !self.cancel.is_cancelled() {
            match self.tick().await {
                Ok(TickOutcome::Indexed { .. }) => {}
                Ok(TickOutcome::Idle { head }) => {
                    self.set_state(ChainState::IdlePoll);
                    if self.effective_batch_size != self.config.batch_size {
                        debug!(
                            "[{}] Restoring batch size to {}",
                            self.chain, self.config.batch_size
                        );
                        self.effective_batch_size = self.config.batch_size;
                    }
                    debug!(
                        "[{}] Caught up at head {}. Sleeping for {:?}",
                        self.chain, head, self.config.poll_interval
                    );
                    if !self.sleep_or_cancel(self.config.poll_interval).await {
                        break;
                    }
                }
                Err(IndexerError::RpcRangeTooLarge { message }) if self.effective_batch_size > 1 => {
                    self.effective_batch_size = (self.effective_batch_size / 2).max(1);
                    warn!(
                        "[{}] Node refused the block range ({}). Retrying with batch size {}",
                        self.chain, message, self.effective_batch_size
                    );
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        "[{}] Indexing failed with a non-retryable error: {}. Stopping chain",
                        self.chain, e
                    );
                    break;
                }
                Err(e) => {
                    error!(
                        "[{}] Indexing failed: {}. Backing off for {:?}",
                        self.chain, e, self.config.error_backoff
                    );
                    self.set_state(ChainState::ErrorBackoff);
                    if !self.sleep_or_cancel(self.config.error_backoff).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ChainState::Stopped);
        info!("[{}] Process terminating.", self.chain);
    }

    /// `false` when cancelled before the sleep finished
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    /// One pass of the state machine: head, resume point, window, process.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let head = match self.provider.get_head_block().await {
            Ok(head) => {
                self.services.status.set_connected(&self.chain, true);
                head
            }
            Err(e) => {
                self.services.status.set_connected(&self.chain, false);
                return Err(e);
            }
        };

        let resume = self.load_resume_point(head).await?;
        let Some((from, to)) = next_batch_window(resume, head, self.effective_batch_size) else {
            return Ok(TickOutcome::Idle { head });
        };

        self.set_state(ChainState::CatchingUp);
        let saved = self.process_window(from, to).await?;
        Ok(TickOutcome::Indexed { from, to, saved })
    }

    /// Reads the checkpoint, seeding it on first run so a restart resumes
    /// from the same place.
    async fn load_resume_point(&self, head: BlockNumber) -> Result<BlockNumber> {
        let checkpoint = self.services.store.get_latest_block(&self.chain).await?;
        if let Some(checkpoint) = checkpoint {
            self.services.status.set_checkpoint(&self.chain, checkpoint);
        }

        let resume = resume_point(
            checkpoint,
            self.config.start_block,
            head,
            self.config.start_block_offset,
        );

        if checkpoint.is_none() && resume.value() > 0 {
            let seed = resume - 1;
            info!("[{}] No checkpoint found, starting at block {}", self.chain, resume);
            self.services
                .store
                .update_latest_block(&self.chain, seed)
                .await?;
            self.services.status.set_checkpoint(&self.chain, seed);
        }

        Ok(resume)
    }

    /// Indexes `[from, to]` and advances the checkpoint to `to`. Nothing is
    /// checkpointed unless the batch was persisted.
    pub async fn process_window(&self, from: BlockNumber, to: BlockNumber) -> Result<u64> {
        let logs = self.provider.get_logs(from, to).await?;
        let drafts = self.decoder.decode_batch(&logs).await;
        let events = self.enrich(drafts).await?;

        let saved = self.services.store.save_transfer_events(&events).await?;
        self.services
            .store
            .update_latest_block(&self.chain, to)
            .await?;
        self.services.status.set_checkpoint(&self.chain, to);

        info!(
            "[{}] Indexed blocks {}..={}: {} logs, {} transfers, {} new",
            self.chain,
            from,
            to,
            logs.len(),
            events.len(),
            saved
        );
        Ok(saved)
    }

    async fn enrich(&self, drafts: Vec<TransferDraft>) -> Result<Vec<TransferEvent>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let timestamps = self.resolve_timestamps(&drafts).await?;

        let addresses: Vec<Address> = drafts
            .iter()
            .flat_map(|d| [d.from.clone(), d.to.clone()])
            .collect();
        let tokens: Vec<Address> = drafts.iter().map(|d| d.token_address.clone()).collect();

        let (labels, prices) = futures::join!(
            self.services.labeler.label_addresses(&addresses, &self.chain),
            self.services.prices.get_batch_prices(&tokens, &self.chain),
        );

        drafts
            .into_iter()
            .map(|draft| {
                let timestamp = match draft.timestamp {
                    Some(ts) => ts,
                    None => *timestamps.get(&draft.block_number).ok_or_else(|| {
                        IndexerError::internal(format!(
                            "No timestamp resolved for block {}",
                            draft.block_number
                        ))
                    })?,
                };
                let usd_value = prices
                    .get(&draft.token_address)
                    .and_then(|price| usd_value(draft.amount, *price));

                Ok(TransferEvent {
                    from_label: labels.get(&draft.from).map(|l| l.label.clone()),
                    to_label: labels.get(&draft.to).map(|l| l.label.clone()),
                    chain: draft.chain,
                    tx_hash: draft.tx_hash,
                    log_index: draft.log_index,
                    block_number: draft.block_number,
                    timestamp,
                    from: draft.from,
                    to: draft.to,
                    token_address: draft.token_address,
                    token_symbol: draft.token_symbol,
                    amount: draft.amount,
                    usd_value,
                })
            })
            .collect()
    }

    /// Timestamps for distinct blocks among drafts the node sent without one
    async fn resolve_timestamps(
        &self,
        drafts: &[TransferDraft],
    ) -> Result<HashMap<BlockNumber, DateTime<Utc>>> {
        let blocks: Vec<BlockNumber> = drafts
            .iter()
            .filter(|d| d.timestamp.is_none())
            .map(|d| d.block_number)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut timestamps = HashMap::with_capacity(blocks.len());
        for chunk in blocks.chunks(TIMESTAMP_CHUNK_SIZE) {
            let results = join_all(
                chunk
                    .iter()
                    .map(|block| self.provider.get_block_timestamp(*block)),
            )
            .await;

            for (block, secs) in chunk.iter().zip(results) {
                let secs = secs?;
                let timestamp = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                    IndexerError::rpc_data("timestamp", format!("Block {block} has timestamp {secs}"))
                })?;
                timestamps.insert(*block, timestamp);
            }
        }
        Ok(timestamps)
    }
}
