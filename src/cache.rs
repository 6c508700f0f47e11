//! # Process-local caches
//!
//! Enrichment components receive their caches at construction time instead of
//! reaching for globals, so every orchestrator (and every test) owns an
//! isolated set. Entries are idempotent facts: concurrent writers racing on the
//! same key simply overwrite each other with equal values.

use std::{hash::Hash, time::Duration};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::types::{Address, AddressLabel, TokenMetadata};

struct Entry<V> {
    value: V,
    /// `None` for unbounded caches
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now <= deadline)
    }
}

/// A sharded concurrent map with an optional time-to-live.
///
/// Shard guards are dropped before returning, never held across an await point.
pub struct Cache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Option<Duration>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Entries never expire
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            entries: DashMap::new(),
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        entry
            .is_live(Instant::now())
            .then(|| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drops expired entries; a no-op for unbounded caches
    pub fn purge_expired(&self) {
        if self.ttl.is_none() {
            return;
        }
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Token metadata keyed by `(chain, token)`; never expires.
pub type TokenMetadataCache = Cache<(String, Address), TokenMetadata>;

/// Positively resolved labels keyed by `(chain, address)`; never expires.
pub type LabelCache = Cache<(String, Address), AddressLabel>;

/// USD prices keyed by `(chain, token)`.
pub type PriceCache = Cache<(String, Address), f64>;

/// How long a resolved USD price stays valid.
pub const PRICE_TTL: Duration = Duration::from_secs(5 * 60);
