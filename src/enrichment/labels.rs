use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::LabelCache;
use crate::errors::{IndexerError, Result};
use crate::types::{Address, AddressLabel, LabelCategory};

pub const LABEL_CHUNK_SIZE: usize = 10;
pub const DEFAULT_LABEL_CHUNK_DELAY: Duration = Duration::from_millis(200);

/// Matches a seed on every chain
pub const ANY_CHAIN: &str = "*";

/// A statically known address, either built in or loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSeed {
    #[serde(default = "any_chain")]
    pub chain: String,
    pub address: String,
    pub label: String,
    pub category: LabelCategory,
}

fn any_chain() -> String {
    ANY_CHAIN.to_string()
}

static BUILTIN_SEEDS: Lazy<Vec<LabelSeed>> = Lazy::new(|| {
    [
        (ANY_CHAIN, "0x0000000000000000000000000000000000000000", "Null Address", LabelCategory::Other),
        ("ethereum", "0x7a250d5630b4cf539739df2c5dacb4c659f2488d", "Uniswap V2: Router", LabelCategory::Dex),
        ("ethereum", "0xe592427a0aece92de3edee1f18e0157c05861564", "Uniswap V3: Router", LabelCategory::Dex),
        ("ethereum", "0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45", "Uniswap V3: Router 2", LabelCategory::Dex),
        ("ethereum", "0x1111111254eeb25477b68fb85ed929f73a960582", "1inch v5: Aggregation Router", LabelCategory::Dex),
        ("ethereum", "0xba12222222228d8ba445958a75a0704d566bf2c8", "Balancer: Vault", LabelCategory::Vault),
        ("ethereum", "0x28c6c06298d514db089934071355e5743bf21d60", "Binance 14", LabelCategory::Wallet),
        ("ethereum", "0x21a31ee1afc51d94c2efccaa2092ad1028285549", "Binance 15", LabelCategory::Wallet),
        ("ethereum", "0x71660c4005ba85c37ccec55d0c4493e66fe775d3", "Coinbase 1", LabelCategory::Wallet),
        ("ethereum", "0x40ec5b33f54e0e8a33a975908c5ba1c14e5bbbdf", "Polygon: ERC20 Bridge", LabelCategory::Bridge),
        ("ethereum", "0x8315177ab297ba92a06054ce80a67ed4dbd7ed3a", "Arbitrum: Bridge", LabelCategory::Bridge),
        ("ethereum", "0x99c9fc46f92e8a1c0dec1b1747d010903e884be1", "Optimism: Gateway", LabelCategory::Bridge),
    ]
    .into_iter()
    .map(|(chain, address, label, category)| LabelSeed {
        chain: chain.to_string(),
        address: address.to_string(),
        label: label.to_string(),
        category,
    })
    .collect()
});

/// External source of address labels.
///
/// `Ok(None)` means the source answered but knows nothing about the address.
#[async_trait]
pub trait LabelSource: Send + Sync {
    async fn lookup(&self, chain: &str, address: &Address) -> Result<Option<AddressLabel>>;
}

#[derive(Debug, Clone)]
pub struct ExplorerEndpoint {
    pub api_url: String,
    pub api_key: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct SourceCodeEntry {
    #[serde(rename = "ContractName", default)]
    contract_name: String,
}

/// Etherscan-compatible `getsourcecode` lookup. A verified contract's name
/// becomes its label.
pub struct ExplorerLabelSource {
    client: Client,
    endpoints: HashMap<String, ExplorerEndpoint>,
    timeout: Duration,
}

impl ExplorerLabelSource {
    pub fn new(endpoints: HashMap<String, ExplorerEndpoint>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoints,
            timeout,
        }
    }

    pub fn has_endpoints(&self) -> bool {
        !self.endpoints.is_empty()
    }
}

#[async_trait]
impl LabelSource for ExplorerLabelSource {
    async fn lookup(&self, chain: &str, address: &Address) -> Result<Option<AddressLabel>> {
        let Some(endpoint) = self.endpoints.get(chain) else {
            return Ok(None);
        };

        let mut query = vec![
            ("module", "contract"),
            ("action", "getsourcecode"),
            ("address", address.value()),
        ];
        if let Some(key) = endpoint.api_key.as_deref() {
            query.push(("apikey", key));
        }

        let response = self
            .client
            .get(&endpoint.api_url)
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| IndexerError::enrichment("explorer", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::enrichment(
                "explorer",
                format!("HTTP {status} for {address}"),
            ));
        }

        let body: ExplorerResponse = response
            .json()
            .await
            .map_err(|e| IndexerError::enrichment("explorer", e.to_string()))?;
        // Errors and rate limits come back as status "0" with a string result
        if body.status != "1" {
            return Ok(None);
        }

        let entries: Vec<SourceCodeEntry> =
            serde_json::from_value(body.result).unwrap_or_default();
        let name = entries
            .into_iter()
            .map(|entry| entry.contract_name.trim().to_string())
            .find(|name| !name.is_empty());

        Ok(name.map(|name| AddressLabel {
            address: address.clone(),
            category: LabelCategory::infer_from_name(&name),
            label: name,
        }))
    }
}

/// Resolves addresses to labels: static seeds, then the positive cache, then
/// the external source. Lookup failures resolve to no label.
pub struct AddressLabeler {
    seeds: HashMap<(String, Address), AddressLabel>,
    cache: Arc<LabelCache>,
    source: Option<Arc<dyn LabelSource>>,
    chunk_delay: Duration,
}

impl AddressLabeler {
    /// Builds the seed table from the built-in entries plus `extra_seeds`.
    /// Configured seeds override built-in ones; malformed addresses are skipped.
    pub fn new(
        extra_seeds: Vec<LabelSeed>,
        cache: Arc<LabelCache>,
        source: Option<Arc<dyn LabelSource>>,
        chunk_delay: Duration,
    ) -> Self {
        let mut seeds = HashMap::new();
        for seed in BUILTIN_SEEDS.iter().cloned().chain(extra_seeds) {
            match Address::new(&seed.address) {
                Ok(address) => {
                    seeds.insert(
                        (seed.chain.to_ascii_lowercase(), address.clone()),
                        AddressLabel {
                            address,
                            label: seed.label,
                            category: seed.category,
                        },
                    );
                }
                Err(e) => warn!("[labels] Skipping seed '{}': {}", seed.label, e),
            }
        }

        Self {
            seeds,
            cache,
            source,
            chunk_delay,
        }
    }

    fn seeded(&self, address: &Address, chain: &str) -> Option<&AddressLabel> {
        self.seeds
            .get(&(chain.to_string(), address.clone()))
            .or_else(|| self.seeds.get(&(ANY_CHAIN.to_string(), address.clone())))
    }

    pub async fn get_label(&self, address: &Address, chain: &str) -> Option<AddressLabel> {
        if let Some(label) = self.seeded(address, chain) {
            return Some(label.clone());
        }

        let key = (chain.to_string(), address.clone());
        if let Some(label) = self.cache.get(&key) {
            debug!("[labels] Cache hit for {} on {}", address, chain);
            return Some(label);
        }

        let source = self.source.as_ref()?;
        match source.lookup(chain, address).await {
            Ok(Some(label)) => {
                self.cache.insert(key, label.clone());
                Some(label)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("[labels] Lookup for {} on {} failed: {}", address, chain, e);
                None
            }
        }
    }

    /// Labels every distinct address, in chunks of [`LABEL_CHUNK_SIZE`] with a
    /// pause between chunks. Unlabeled addresses are absent from the map.
    pub async fn label_addresses(
        &self,
        addresses: &[Address],
        chain: &str,
    ) -> HashMap<Address, AddressLabel> {
        let mut seen = HashSet::new();
        let unique: Vec<&Address> = addresses
            .iter()
            .filter(|address| seen.insert(*address))
            .collect();

        let mut labels = HashMap::with_capacity(unique.len());
        for (i, chunk) in unique.chunks(LABEL_CHUNK_SIZE).enumerate() {
            if i > 0 && self.source.is_some() && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            let resolved = join_all(chunk.iter().map(|address| self.get_label(address, chain))).await;
            for (address, label) in chunk.iter().zip(resolved) {
                if let Some(label) = label {
                    labels.insert((*address).clone(), label);
                }
            }
        }
        labels
    }
}
