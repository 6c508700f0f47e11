use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::cache::PriceCache;
use crate::errors::{IndexerError, Result};
use crate::types::Address;

pub const PRICE_CHUNK_SIZE: usize = 50;
pub const DEFAULT_PRICE_CHUNK_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko asset platform id for a configured chain name
pub fn platform_for_chain(chain: &str) -> Option<&'static str> {
    match chain {
        "ethereum" => Some("ethereum"),
        "polygon" => Some("polygon-pos"),
        "arbitrum" => Some("arbitrum-one"),
        "optimism" => Some("optimistic-ethereum"),
        "base" => Some("base"),
        "bsc" => Some("binance-smart-chain"),
        "avalanche" => Some("avalanche"),
        "fantom" => Some("fantom"),
        _ => None,
    }
}

fn is_usable_price(price: f64) -> bool {
    price.is_finite() && price >= 0.0
}

/// Source of USD token prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the source has no price for the token.
    async fn fetch_price(&self, chain: &str, token: &Address) -> Result<Option<f64>>;

    /// Prices for several tokens; tokens without a price are absent.
    async fn fetch_prices(&self, chain: &str, tokens: &[Address]) -> Result<HashMap<Address, f64>> {
        let mut prices = HashMap::new();
        for token in tokens {
            if let Some(price) = self.fetch_price(chain, token).await? {
                prices.insert(token.clone(), price);
            }
        }
        Ok(prices)
    }
}

/// CoinGecko `simple/token_price` client
pub struct CoinGeckoPriceSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl CoinGeckoPriceSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    async fn query(&self, platform: &str, tokens: &[Address]) -> Result<HashMap<Address, f64>> {
        let contracts = tokens
            .iter()
            .map(Address::value)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/simple/token_price/{platform}", self.base_url);

        let mut request = self
            .client
            .get(url)
            .query(&[("contract_addresses", contracts.as_str()), ("vs_currencies", "usd")])
            .timeout(self.timeout);
        if let Some(key) = self.api_key.as_deref() {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IndexerError::enrichment(self.name(), e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::enrichment(
                self.name(),
                format!("HTTP {status}"),
            ));
        }

        // {"0xtoken": {"usd": 1.0}}, keyed by the lowercase contract address
        let body: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .map_err(|e| IndexerError::enrichment(self.name(), e.to_string()))?;

        Ok(body
            .into_iter()
            .filter_map(|(contract, quotes)| {
                let address = Address::new(&contract).ok()?;
                quotes.get("usd").map(|price| (address, *price))
            })
            .collect())
    }
}

#[async_trait]
impl PriceSource for CoinGeckoPriceSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_price(&self, chain: &str, token: &Address) -> Result<Option<f64>> {
        let prices = self.fetch_prices(chain, std::slice::from_ref(token)).await?;
        Ok(prices.get(token).copied())
    }

    async fn fetch_prices(&self, chain: &str, tokens: &[Address]) -> Result<HashMap<Address, f64>> {
        let Some(platform) = platform_for_chain(chain) else {
            debug!("[prices] No price platform for chain {}", chain);
            return Ok(HashMap::new());
        };
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        self.query(platform, tokens).await
    }
}

/// Resolves USD prices through a TTL cache, a primary source and an optional
/// fallback source. Every failure degrades to "no price".
pub struct PriceResolver {
    cache: Arc<PriceCache>,
    primary: Arc<dyn PriceSource>,
    fallback: Option<Arc<dyn PriceSource>>,
    chunk_delay: Duration,
}

impl PriceResolver {
    pub fn new(
        cache: Arc<PriceCache>,
        primary: Arc<dyn PriceSource>,
        fallback: Option<Arc<dyn PriceSource>>,
        chunk_delay: Duration,
    ) -> Self {
        Self {
            cache,
            primary,
            fallback,
            chunk_delay,
        }
    }

    pub async fn get_token_price(&self, token: &Address, chain: &str) -> Option<f64> {
        let key = (chain.to_string(), token.clone());
        if let Some(price) = self.cache.get(&key) {
            debug!("[prices] Cache hit for {} on {}", token, chain);
            return Some(price);
        }

        let mut sources = std::iter::once(&self.primary).chain(self.fallback.as_ref());
        let price = loop {
            let source = sources.next()?;
            match source.fetch_price(chain, token).await {
                Ok(Some(price)) if is_usable_price(price) => break price,
                Ok(Some(price)) => {
                    warn!("[prices] {} returned unusable price {} for {}", source.name(), price, token);
                }
                Ok(None) => {}
                Err(e) => debug!("[prices] {} failed for {}: {}", source.name(), token, e),
            }
        };

        self.cache.insert(key, price);
        Some(price)
    }

    /// Prices every distinct token, in chunks of [`PRICE_CHUNK_SIZE`] with a
    /// pause between chunks that reached upstream. Unpriced tokens are absent.
    /// Expired entries are evicted first, once per batch.
    pub async fn get_batch_prices(&self, tokens: &[Address], chain: &str) -> HashMap<Address, f64> {
        self.cache.purge_expired();

        let mut seen = HashSet::new();
        let unique: Vec<Address> = tokens
            .iter()
            .filter(|token| seen.insert(*token))
            .cloned()
            .collect();

        let mut prices = HashMap::with_capacity(unique.len());
        let mut went_upstream = false;
        for chunk in unique.chunks(PRICE_CHUNK_SIZE) {
            let mut misses = Vec::new();
            for token in chunk {
                match self.cache.get(&(chain.to_string(), token.clone())) {
                    Some(price) => {
                        prices.insert(token.clone(), price);
                    }
                    None => misses.push(token.clone()),
                }
            }
            if misses.is_empty() {
                continue;
            }

            if went_upstream && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            went_upstream = true;

            for source in std::iter::once(&self.primary).chain(self.fallback.as_ref()) {
                if misses.is_empty() {
                    break;
                }
                let found = match source.fetch_prices(chain, &misses).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!("[prices] {} batch lookup failed on {}: {}", source.name(), chain, e);
                        continue;
                    }
                };
                misses.retain(|token| match found.get(token) {
                    Some(price) if is_usable_price(*price) => {
                        self.cache.insert((chain.to_string(), token.clone()), *price);
                        prices.insert(token.clone(), *price);
                        false
                    }
                    _ => true,
                });
            }
        }
        prices
    }
}
