use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use eyre::{eyre, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use transfer_indexer::{
    config::{ChainConfig, IndexingConfig, DEFAULT_BATCH_SIZE},
    enrichment::{prices::DEFAULT_PRICE_API_URL, LabelSeed},
    indexer::lib::start_indexing_services,
    store::{StoreBackend, StoreConfig},
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Comma separated chain names; each needs `<CHAIN>_RPC_URL`
    #[arg(long, env = "INDEXER_CHAINS", value_delimiter = ',', required = true)]
    chains: Vec<String>,

    #[arg(long, env = "STORE_BACKEND", default_value_t = StoreBackend::Postgres)]
    store_backend: StoreBackend,

    #[arg(long, env = "DB_CONNECTION_STRING")]
    db_connection_string: Option<String>,

    /// Blocks per `eth_getLogs` window
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: u32,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 12_000)]
    poll_interval_ms: u64,

    #[arg(long, env = "ERROR_BACKOFF_MS", default_value_t = 30_000)]
    error_backoff_ms: u64,

    /// Seconds
    #[arg(long, env = "RPC_TIMEOUT", default_value_t = 30)]
    rpc_timeout: u64,

    #[arg(long, env = "PRICE_API_URL")]
    price_api_url: Option<String>,

    #[arg(long, env = "PRICE_API_KEY")]
    price_api_key: Option<String>,

    /// JSON list of extra static address labels
    #[arg(long, env = "LABELS_FILE")]
    labels_file: Option<PathBuf>,

    /// Health router address, e.g. 0.0.0.0:3000
    #[arg(long, env = "ROUTER_ENDPOINT")]
    router_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    if env::var("IS_DEV").is_ok_and(|v| v.parse().unwrap_or(false)) {
        dotenvy::dotenv()?;
    }

    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = build_config(cli)?;

    let cancel = CancellationToken::new();
    setup_ctrlc_handler(cancel.clone())?;

    info!("Starting Indexer");
    start_indexing_services(config, cancel).await?;
    info!("Indexer stopped");

    Ok(())
}

fn build_config(cli: Cli) -> Result<IndexingConfig> {
    let chains = cli
        .chains
        .iter()
        .map(|name| chain_from_env(name.trim()))
        .collect::<Result<Vec<_>>>()?;

    let store = match cli.store_backend {
        StoreBackend::Memory => StoreConfig::memory(),
        StoreBackend::Postgres => StoreConfig::postgres(
            cli.db_connection_string.ok_or_else(|| {
                eyre!("DB_CONNECTION_STRING must be set for the postgres store")
            })?,
        ),
    };

    let mut builder = IndexingConfig::builder()
        .chains(chains)
        .store(store)
        .batch_size(cli.batch_size)
        .poll_interval(Duration::from_millis(cli.poll_interval_ms))
        .error_backoff(Duration::from_millis(cli.error_backoff_ms))
        .rpc_timeout(Duration::from_secs(cli.rpc_timeout));

    if let Some(url) = cli.price_api_url {
        builder = builder.price_api(url, cli.price_api_key);
    } else if let Some(key) = cli.price_api_key {
        builder = builder.price_api(DEFAULT_PRICE_API_URL, Some(key));
    }
    if let Some(path) = cli.labels_file {
        builder = builder.label_seeds(load_label_seeds(&path)?);
    }
    if let Some(endpoint) = cli.router_endpoint {
        builder = builder.router_endpoint(endpoint);
    }

    builder.build().context("Invalid indexer configuration")
}

/// Reads `<CHAIN>_RPC_URL` and the optional per-chain settings.
fn chain_from_env(name: &str) -> Result<ChainConfig> {
    let prefix = name.to_ascii_uppercase().replace('-', "_");
    let var = |suffix: &str| env::var(format!("{prefix}_{suffix}")).ok();

    let rpc_url = var("RPC_URL").ok_or_else(|| eyre!("{prefix}_RPC_URL must be set"))?;
    let mut chain = ChainConfig::new(name.to_ascii_lowercase(), rpc_url);

    if let Some(start) = var("START_BLOCK") {
        let start = start
            .parse::<i64>()
            .with_context(|| format!("{prefix}_START_BLOCK must be a block number"))?;
        chain = chain.with_start_block(start);
    }
    if let Some(url) = var("EXPLORER_API_URL") {
        chain = chain.with_explorer(url, var("EXPLORER_API_KEY"));
    }
    Ok(chain)
}

fn load_label_seeds(path: &Path) -> Result<Vec<LabelSeed>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read labels file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse labels file {}", path.display()))
}

fn setup_ctrlc_handler(cancel: CancellationToken) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C");
        info!("Waiting for current processes to finish...");
        cancel.cancel();
    })
    .context("Failed to set Ctrl+C handler")
}
