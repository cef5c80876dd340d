//! Two-tier result cache
//!
//! An in-process map in front of the durable store. Entries carry their write
//! time and are judged against the TTL configured *at read time*, so a TTL
//! change applies to entries already cached. There is no background sweep:
//! stale entries are simply ignored on read and overwritten on the next set.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::ProductRecord;
use crate::error::{ResolutionError, ResolutionResult};
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::config::SharedConfig;
use crate::infrastructure::storage::{DurableStore, StoreEntries};

static NON_ALNUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]").unwrap_or_else(|e| panic!("invalid key regex: {e}")));

const TITLE_KEY_CHARS: usize = 20;
const MAX_TTL_HOURS: i64 = 24 * 365 * 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.timestamp) <= ttl
    }
}

/// Cache key for a product: the strongest identity available, prefixed by
/// the cache namespace and the product's marketplace.
///
/// UPC, then ASIN, then the marketplace-local id; failing all of those a
/// normalized title (first 20 characters) with the price rounded to whole units.
pub fn derive_key(namespace: &str, product: &ProductRecord) -> String {
    let present = |value: &Option<String>| value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);

    let identity = present(&product.upc)
        .map(|upc| format!("upc_{upc}"))
        .or_else(|| present(&product.asin).map(|asin| format!("asin_{asin}")))
        .or_else(|| {
            Some(product.product_id.trim())
                .filter(|id| !id.is_empty())
                .map(|id| format!("id_{id}"))
        })
        .unwrap_or_else(|| {
            let title: String = NON_ALNUM_RE
                .replace_all(&product.title.to_lowercase(), "")
                .chars()
                .take(TITLE_KEY_CHARS)
                .collect();
            let price = product
                .price
                .map_or_else(|| "na".to_string(), |p| p.round().to_string());
            format!("title_{title}_{price}")
        });

    format!("{namespace}{}_{identity}", product.marketplace.as_str())
}

pub struct CacheService {
    config: SharedConfig,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    memory: RwLock<HashMap<String, CacheEntry<Value>>>,
}

impl CacheService {
    pub fn new(config: SharedConfig, store: Arc<dyn DurableStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SharedConfig, store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
            memory: RwLock::new(HashMap::new()),
        }
    }

    async fn ttl(&self) -> Duration {
        let hours = self.config.read().await.cache.ttl_hours;
        Duration::hours(i64::try_from(hours).unwrap_or(MAX_TTL_HOURS).min(MAX_TTL_HOURS))
    }

    pub async fn namespace(&self) -> String {
        self.config.read().await.cache.namespace.clone()
    }

    pub async fn key_for(&self, product: &ProductRecord) -> String {
        derive_key(&self.namespace().await, product)
    }

    /// Fresh value for `key`, from memory first and the durable store second.
    ///
    /// Durable read failures are logged and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let ttl = self.ttl().await;
        let now = self.clock.now();

        let in_memory = self.memory.read().await.get(key).cloned();
        if let Some(entry) = in_memory {
            if entry.is_fresh(now, ttl) {
                debug!("Cache hit (memory): {}", key);
                return decode(key, entry.data);
            }
            self.memory.write().await.remove(key);
        }

        let entry = match self.read_durable(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("Cache miss: {}", key);
                return None;
            }
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };

        if !entry.is_fresh(now, ttl) {
            debug!("Cache entry expired: {} (written {})", key, entry.timestamp);
            return None;
        }

        debug!("Cache hit (durable): {}", key);
        self.memory.write().await.insert(key.to_string(), entry.clone());
        decode(key, entry.data)
    }

    async fn read_durable(&self, key: &str) -> ResolutionResult<Option<CacheEntry<Value>>> {
        let failure = |reason: String| ResolutionError::CacheReadFailure {
            key: key.to_string(),
            reason,
        };
        let mut found = self
            .store
            .get(&[key.to_string()])
            .await
            .map_err(|e| failure(e.to_string()))?;
        found
            .remove(key)
            .map(|value| serde_json::from_value(value).map_err(|e| failure(e.to_string())))
            .transpose()
    }

    /// Write to both tiers, timestamped now
    pub async fn set<T: Serialize + Sync>(&self, key: &str, data: &T) -> ResolutionResult<()> {
        let data = serde_json::to_value(data)
            .map_err(|e| ResolutionError::Storage(format!("failed to serialize cache entry '{key}': {e}")))?;
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now(),
        };
        let value = serde_json::to_value(&entry)
            .map_err(|e| ResolutionError::Storage(format!("failed to serialize cache entry '{key}': {e}")))?;

        self.memory.write().await.insert(key.to_string(), entry);

        let mut entries = StoreEntries::new();
        entries.insert(key.to_string(), value);
        self.store.set(entries).await
    }

    /// Empty the memory tier and drop every durable key under the namespace.
    /// Returns the number of durable entries removed.
    pub async fn clear(&self) -> ResolutionResult<usize> {
        self.memory.write().await.clear();

        let namespace = self.namespace().await;
        let keys: Vec<String> = self
            .store
            .get_all()
            .await?
            .into_keys()
            .filter(|key| key.starts_with(&namespace))
            .collect();
        if !keys.is_empty() {
            self.store.remove(&keys).await?;
        }
        info!("🧹 Cache cleared: {} durable entries removed", keys.len());
        Ok(keys.len())
    }

    pub async fn memory_len(&self) -> usize {
        self.memory.read().await.len()
    }
}

fn decode<T: DeserializeOwned>(key: &str, data: Value) -> Option<T> {
    serde_json::from_value(data)
        .map_err(|e| warn!("Cached value for '{}' has an unexpected shape: {}", key, e))
        .ok()
}
