//! Durable key-value storage
//!
//! A flat namespaced store of JSON values. The cache service and batch result
//! persistence are expressed purely in terms of [`DurableStore`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{ResolutionError, ResolutionResult};

pub type StoreEntries = BTreeMap<String, Value>;

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Values for the keys that exist; missing keys are simply absent
    async fn get(&self, keys: &[String]) -> ResolutionResult<StoreEntries>;

    async fn set(&self, entries: StoreEntries) -> ResolutionResult<()>;

    async fn remove(&self, keys: &[String]) -> ResolutionResult<()>;

    async fn get_all(&self) -> ResolutionResult<StoreEntries>;
}

/// Process-local store for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<StoreEntries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, keys: &[String]) -> ResolutionResult<StoreEntries> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: StoreEntries) -> ResolutionResult<()> {
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> ResolutionResult<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn get_all(&self) -> ResolutionResult<StoreEntries> {
        Ok(self.entries.read().await.clone())
    }
}

/// Whole store kept as one JSON object on disk.
///
/// The document is loaded on first use and rewritten (temp file + rename) on
/// every mutation.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<Option<StoreEntries>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ResolutionResult<StoreEntries> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(StoreEntries::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ResolutionError::Storage(format!("store file {:?} is not a JSON object: {e}", self.path))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store file {:?} not found, starting empty", self.path);
                Ok(StoreEntries::new())
            }
            Err(e) => Err(ResolutionError::Storage(format!("failed to read {:?}: {e}", self.path))),
        }
    }

    async fn persist(&self, entries: &StoreEntries) -> ResolutionResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ResolutionError::Storage(format!("failed to create {parent:?}: {e}")))?;
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| ResolutionError::Storage(format!("failed to serialize store: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| ResolutionError::Storage(format!("failed to write {tmp:?}: {e}")))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ResolutionError::Storage(format!("failed to replace {:?}: {e}", self.path)))
    }

    /// Run `f` over the loaded document; persist when it reports a change
    async fn with_entries<T>(&self, f: impl FnOnce(&mut StoreEntries) -> (T, bool) + Send) -> ResolutionResult<T> {
        let mut state = self.state.lock().await;
        if state.is_none() {
            *state = Some(self.load().await?);
        }
        let entries = state
            .as_mut()
            .ok_or_else(|| ResolutionError::Storage("store state unavailable".to_string()))?;
        let (result, changed) = f(entries);
        if changed {
            if let Err(e) = self.persist(entries).await {
                warn!("Store write failed, dropping in-memory view: {}", e);
                *state = None;
                return Err(e);
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn get(&self, keys: &[String]) -> ResolutionResult<StoreEntries> {
        self.with_entries(|entries| {
            let found = keys
                .iter()
                .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
                .collect();
            (found, false)
        })
        .await
    }

    async fn set(&self, new_entries: StoreEntries) -> ResolutionResult<()> {
        self.with_entries(|entries| {
            entries.extend(new_entries);
            ((), true)
        })
        .await
    }

    async fn remove(&self, keys: &[String]) -> ResolutionResult<()> {
        self.with_entries(|entries| {
            let before = entries.len();
            for key in keys {
                entries.remove(key);
            }
            ((), entries.len() != before)
        })
        .await
    }

    async fn get_all(&self) -> ResolutionResult<StoreEntries> {
        self.with_entries(|entries| (entries.clone(), false)).await
    }
}
