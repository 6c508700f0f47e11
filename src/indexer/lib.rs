use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    cache::{LabelCache, PriceCache, TokenMetadataCache, PRICE_TTL},
    config::{ChainConfig, IndexingConfig},
    enrichment::{
        AddressLabeler, CoinGeckoPriceSource, ExplorerEndpoint, ExplorerLabelSource, LabelSource,
        PriceResolver,
    },
    errors::{IndexerError, Result},
    indexer::{
        chain_service::{ChainIndexConfig, ChainIndexer, SharedServices},
        status::{ChainState, ChainStatus, StatusBoard},
    },
    router,
    rpc::{ChainProvider, JsonRpcChainClient},
    store::{Store, TransferEventFilter},
    types::TransferEvent,
};

/// The read side of a running indexer. Cheap to clone.
#[derive(Clone)]
pub struct IndexerHandle {
    store: Arc<Store>,
    status: Arc<StatusBoard>,
}

impl IndexerHandle {
    pub const fn new(store: Arc<Store>, status: Arc<StatusBoard>) -> Self {
        Self { store, status }
    }

    /// Per-chain checkpoint, connectivity and loop state
    pub fn get_status(&self) -> HashMap<String, ChainStatus> {
        self.status.snapshot()
    }

    pub async fn get_transfer_events(
        &self,
        filter: &TransferEventFilter,
    ) -> Result<Vec<TransferEvent>> {
        self.store.get_transfer_events(filter).await
    }

    pub async fn check_store(&self) -> Result<()> {
        self.store.check_connection().await
    }
}

/// Runs one supervised task per chain until cancelled.
pub struct IndexingOrchestrator<C> {
    chains: Vec<ChainIndexer<C>>,
    services: SharedServices,
    cancel: CancellationToken,
    restart_delay: Duration,
}

impl<C> IndexingOrchestrator<C>
where
    C: ChainProvider + Send + Sync + 'static,
{
    pub const fn new(
        services: SharedServices,
        cancel: CancellationToken,
        restart_delay: Duration,
    ) -> Self {
        Self {
            chains: Vec::new(),
            services,
            cancel,
            restart_delay,
        }
    }

    pub fn add_chain(
        &mut self,
        name: &str,
        provider: Arc<C>,
        config: ChainIndexConfig,
    ) -> Result<()> {
        if self.chains.iter().any(|c| c.chain() == name) {
            return Err(IndexerError::configuration(
                "chains",
                format!("Chain '{name}' is configured more than once"),
            ));
        }
        self.chains.push(ChainIndexer::new(
            name,
            provider,
            config,
            self.services.clone(),
            self.cancel.clone(),
        ));
        Ok(())
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn handle(&self) -> IndexerHandle {
        IndexerHandle::new(self.services.store.clone(), self.services.status.clone())
    }

    pub fn get_status(&self) -> HashMap<String, ChainStatus> {
        self.services.status.snapshot()
    }

    pub async fn get_transfer_events(
        &self,
        filter: &TransferEventFilter,
    ) -> Result<Vec<TransferEvent>> {
        self.services.store.get_transfer_events(filter).await
    }

    /// Returns once every chain task has stopped.
    pub async fn run(self) {
        let handles: Vec<JoinHandle<()>> = self
            .chains
            .into_iter()
            .map(|indexer| {
                tokio::spawn(supervise(
                    indexer,
                    self.services.status.clone(),
                    self.cancel.clone(),
                    self.restart_delay,
                ))
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("[orchestrator] Supervisor task failed: {:?}", e);
            }
        }
        info!("[orchestrator] All chains stopped");
    }
}

/// Keeps a chain task alive: a panic is logged and the task restarted from
/// its persisted checkpoint after `restart_delay`.
async fn supervise<C>(
    template: ChainIndexer<C>,
    status: Arc<StatusBoard>,
    cancel: CancellationToken,
    restart_delay: Duration,
) where
    C: ChainProvider + Send + Sync + 'static,
{
    let chain = template.chain().to_string();
    loop {
        let mut worker = template.clone();
        match tokio::spawn(async move { worker.run().await }).await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                error!(
                    "[{}] Indexer task panicked: {}. Restarting in {:?}",
                    chain, e, restart_delay
                );
                status.set_state(&chain, ChainState::ErrorBackoff);
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(restart_delay) => {}
                }
            }
            Err(e) => {
                warn!("[{}] Indexer task was cancelled: {}", chain, e);
                break;
            }
        }
    }
    status.set_state(&chain, ChainState::Stopped);
}

/// Caches, labeler and price resolver for `config`, shared by every chain.
pub fn build_shared_services(config: &IndexingConfig, store: Arc<Store>) -> SharedServices {
    let endpoints: HashMap<String, ExplorerEndpoint> = config
        .chains
        .iter()
        .filter_map(|chain| {
            chain.explorer_api_url.as_ref().map(|url| {
                (
                    chain.name.clone(),
                    ExplorerEndpoint {
                        api_url: url.clone(),
                        api_key: chain.explorer_api_key.clone(),
                    },
                )
            })
        })
        .collect();

    let explorer = ExplorerLabelSource::new(endpoints, config.rpc_timeout);
    let label_source: Option<Arc<dyn LabelSource>> = if explorer.has_endpoints() {
        Some(Arc::new(explorer))
    } else {
        info!("[labels] No explorer configured, using static labels only");
        None
    };

    let labeler = AddressLabeler::new(
        config.label_seeds.clone(),
        Arc::new(LabelCache::unbounded()),
        label_source,
        config.label_chunk_delay,
    );

    let prices = PriceResolver::new(
        Arc::new(PriceCache::with_ttl(PRICE_TTL)),
        Arc::new(CoinGeckoPriceSource::new(
            config.price_api_url.clone(),
            config.price_api_key.clone(),
            config.rpc_timeout,
        )),
        None,
        config.price_chunk_delay,
    );

    SharedServices {
        store,
        labeler: Arc::new(labeler),
        prices: Arc::new(prices),
        metadata_cache: Arc::new(TokenMetadataCache::unbounded()),
        status: Arc::new(StatusBoard::new()),
    }
}

fn add_configured_chain(
    orchestrator: &mut IndexingOrchestrator<JsonRpcChainClient>,
    config: &IndexingConfig,
    chain: &ChainConfig,
) -> Result<()> {
    chain.validate()?;
    let client = JsonRpcChainClient::new(&chain.name, &chain.rpc_url, config.rpc_timeout)?;
    orchestrator.add_chain(
        &chain.name,
        Arc::new(client),
        ChainIndexConfig::from_config(config, chain),
    )
}

fn spawn_router_service(
    endpoint: String,
    handle: IndexerHandle,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = router::initialize_router(&endpoint, handle, cancel).await {
            error!("[router] unexpected error {}", e);
        }
        info!("[router] shutting down");
    })
}

/// Connects the store, starts every valid chain and the optional health
/// router, and runs until `cancel` fires.
///
/// A chain whose configuration is invalid is logged and skipped; it is an
/// error only when no chain is left to run.
pub async fn start_indexing_services(
    config: IndexingConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let store = Arc::new(Store::connect(&config.store).await?);
    let services = build_shared_services(&config, store.clone());
    let status = services.status.clone();
    let mut orchestrator = IndexingOrchestrator::new(services, cancel.clone(), config.error_backoff);

    for chain in &config.chains {
        if let Err(e) = add_configured_chain(&mut orchestrator, &config, chain) {
            error!("[{}] Chain disabled: {}", chain.name, e);
            status.set_state(&chain.name, ChainState::Stopped);
        }
    }

    if orchestrator.chain_count() == 0 {
        store.disconnect().await;
        return Err(IndexerError::configuration(
            "chains",
            "No valid chain configuration",
        ));
    }

    let router_handle = config
        .router_endpoint
        .clone()
        .map(|endpoint| spawn_router_service(endpoint, orchestrator.handle(), cancel.clone()));

    info!(
        "[orchestrator] Indexing {} chain(s)",
        orchestrator.chain_count()
    );
    orchestrator.run().await;

    if let Some(router_handle) = router_handle {
        cancel.cancel();
        if let Err(e) = router_handle.await {
            error!("[router] task failed: {:?}", e);
        }
    }

    store.disconnect().await;
    Ok(())
}
