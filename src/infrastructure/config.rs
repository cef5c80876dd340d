//! Configuration infrastructure
//!
//! `AppConfig` is loaded once at startup and handed to constructors. Values
//! that must be read live (the cache TTL) go through [`SharedConfig`].
//!
//! Sources, lowest priority first:
//! 1. compiled defaults ([`defaults`])
//! 2. the JSON file managed by [`ConfigManager`]
//! 3. `RESALE_SCOUT_*` environment variables (`__` separates sections,
//!    e.g. `RESALE_SCOUT_CACHE__TTL_HOURS=6`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::FeeSchedule;
use crate::matching::similarity::TitleSimilarityOptions;

pub const ENV_PREFIX: &str = "RESALE_SCOUT";

/// Live configuration handle shared by long-lived services
pub type SharedConfig = Arc<RwLock<AppConfig>>;

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub matching: MatchingConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub fees: FeeSchedule,
    pub http: HttpConfig,
    pub remote_api: RemoteApiConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Single-product match finder thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Top candidate must reach this score for a successful match
    pub min_similarity: f64,
    /// Cap on candidates returned for review
    pub max_results: usize,
    pub title_options: TitleSimilarityOptions,
}

/// Category batch automation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub product_delay_ms: u64,
    pub batch_delay_ms: u64,
    pub load_timeout_seconds: u64,
    pub extraction_timeout_seconds: u64,
    /// Candidates below this score are not kept in batch results
    pub batch_min_similarity: f64,
    pub batch_max_matches: usize,
    /// Continuation pages followed when scanning a category page
    pub max_scroll_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this are treated as misses; read at lookup time
    pub ttl_hours: u64,
    /// Prefix of every durable key owned by the cache
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Marketplace-data proxy in front of the paid product APIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON store location; the app data directory when unset
    pub path: Option<PathBuf>,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Log directory; `<app data>/logs` when unset
    pub log_dir: Option<PathBuf>,
    /// Per-target levels, e.g. "reqwest" = "warn"
    pub module_filters: HashMap<String, String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_similarity: defaults::MIN_SIMILARITY,
            max_results: defaults::MAX_RESULTS,
            title_options: TitleSimilarityOptions::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            product_delay_ms: defaults::PRODUCT_DELAY_MS,
            batch_delay_ms: defaults::BATCH_DELAY_MS,
            load_timeout_seconds: defaults::LOAD_TIMEOUT_SECONDS,
            extraction_timeout_seconds: defaults::EXTRACTION_TIMEOUT_SECONDS,
            batch_min_similarity: defaults::BATCH_MIN_SIMILARITY,
            batch_max_matches: defaults::BATCH_MAX_MATCHES,
            max_scroll_pages: defaults::MAX_SCROLL_PAGES,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: defaults::CACHE_TTL_HOURS,
            namespace: defaults::CACHE_NAMESPACE.to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_retries: defaults::RETRY_ATTEMPTS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
        }
    }
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::REMOTE_API_BASE_URL.to_string(),
            api_key: None,
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let module_filters = [("reqwest", "warn"), ("hyper", "warn"), ("html5ever", "warn"), ("selectors", "warn")]
            .into_iter()
            .map(|(target, level)| (target.to_string(), level.to_string()))
            .collect();
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            module_filters,
        }
    }
}

impl AppConfig {
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.matching.min_similarity) {
            return Err(format!("matching.min_similarity must be within 0..=1, got {}", self.matching.min_similarity));
        }
        if !(0.0..=1.0).contains(&self.batch.batch_min_similarity) {
            return Err(format!(
                "batch.batch_min_similarity must be within 0..=1, got {}",
                self.batch.batch_min_similarity
            ));
        }
        if self.matching.max_results == 0 {
            return Err("matching.max_results must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.matching.title_options.partial_weight) {
            return Err("matching.title_options.partial_weight must be within 0..=1".to_string());
        }
        if self.batch.batch_size == 0 {
            return Err("batch.batch_size must be greater than 0".to_string());
        }
        if self.batch.load_timeout_seconds == 0 || self.batch.extraction_timeout_seconds == 0 {
            return Err("batch timeouts must be greater than 0".to_string());
        }
        if self.cache.namespace.trim().is_empty() {
            return Err("cache.namespace must not be empty".to_string());
        }
        if self.http.timeout_seconds == 0 {
            return Err("http.timeout_seconds must be greater than 0".to_string());
        }
        self.fees.validate()
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("resale-scout");
        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join("resale-scout");
        Ok(data_dir)
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("resale_scout_config.json");
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file, creating the default one on first run
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("Configuration file unreadable ({}), resetting to defaults", parse_error);
                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }
                self.reset_to_defaults().await
            }
        }
    }

    /// File plus `RESALE_SCOUT_*` environment overrides, validated
    pub async fn load_layered(&self) -> Result<AppConfig> {
        // Make sure the file exists so a first run writes the defaults out
        self.load_config().await?;

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).context("Failed to seed default configuration")?)
            .add_source(config::File::from(self.config_path.clone()).format(config::FileFormat::Json).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build layered configuration")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to deserialize layered configuration")?;
        config.validate().map_err(|message| anyhow::anyhow!("Invalid configuration: {message}"))?;
        Ok(config)
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    pub async fn update_config<F>(&self, updater: F) -> Result<AppConfig>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config);
        config.validate().map_err(|message| anyhow::anyhow!("Invalid configuration: {message}"))?;
        self.save_config(&config).await?;
        Ok(config)
    }

    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        info!("Resetting configuration to defaults");
        let default_config = AppConfig::default();
        self.save_config(&default_config)
            .await
            .context("Failed to save default configuration")?;
        Ok(default_config)
    }
}

/// Default configuration values
pub mod defaults {
    pub const MIN_SIMILARITY: f64 = 0.6;
    pub const MAX_RESULTS: usize = 10;

    pub const BATCH_SIZE: usize = 5;
    pub const PRODUCT_DELAY_MS: u64 = 500;
    pub const BATCH_DELAY_MS: u64 = 1000;
    pub const LOAD_TIMEOUT_SECONDS: u64 = 20;
    pub const EXTRACTION_TIMEOUT_SECONDS: u64 = 10;
    pub const BATCH_MIN_SIMILARITY: f64 = 0.6;
    pub const BATCH_MAX_MATCHES: usize = 3;
    pub const MAX_SCROLL_PAGES: usize = 3;

    pub const CACHE_TTL_HOURS: u64 = 24;
    pub const CACHE_NAMESPACE: &str = "cache_";

    pub const USER_AGENT: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const RETRY_ATTEMPTS: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 1000;

    pub const REMOTE_API_BASE_URL: &str = "http://localhost:8787/api";

    pub const LOG_LEVEL: &str = "info";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Marketplace;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.matching.min_similarity - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.batch.batch_size, 5);
        assert_eq!(config.cache.namespace, "cache_");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = AppConfig::default();
        config.matching.min_similarity = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.batch.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_first_load_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.json"));

        let config = manager.load_config().await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(manager.config_path().exists());
    }

    #[tokio::test]
    async fn test_update_persists_and_partial_files_fill_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let manager = ConfigManager::with_path(&path);

        manager.update_config(|c| c.cache.ttl_hours = 6).await.unwrap();
        assert_eq!(manager.load_config().await.unwrap().cache.ttl_hours, 6);

        tokio::fs::write(&path, r#"{ "batch": { "batch_size": 2 } }"#).await.unwrap();
        let config = manager.load_config().await.unwrap();
        assert_eq!(config.batch.batch_size, 2);
        assert_eq!(config.batch.load_timeout_seconds, defaults::LOAD_TIMEOUT_SECONDS);
    }

    #[tokio::test]
    async fn test_corrupted_file_resets_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let manager = ConfigManager::with_path(&path);
        assert_eq!(manager.load_config().await.unwrap(), AppConfig::default());
        assert!(path.with_extension("json.corrupted").exists());
    }

    #[tokio::test]
    async fn test_layered_load_keeps_fee_schedule() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        let plain = manager.load_config().await.unwrap();
        let layered = manager.load_layered().await.unwrap();
        assert_eq!(layered.fees, plain.fees);
        assert_eq!(layered.fees.fee_fraction(Marketplace::Walmart), Decimal::new(15, 2));
        assert_eq!(layered.fees.fee_fraction(Marketplace::HomeDepot), Decimal::new(15, 2));

        manager
            .update_config(|c| {
                c.fees.marketplace_fees.insert(Marketplace::Target, Decimal::new(8, 2));
                c.fees.additional_fees = Decimal::ONE;
                c.cache.ttl_hours = 6;
            })
            .await
            .unwrap();
        let layered = manager.load_layered().await.unwrap();
        assert_eq!(layered.fees.fee_fraction(Marketplace::Target), Decimal::new(8, 2));
        assert_eq!(layered.fees.fee_fraction(Marketplace::Walmart), Decimal::new(15, 2));
        assert_eq!(layered.fees.additional_fees, Decimal::ONE);
        assert_eq!(layered.cache.ttl_hours, 6);
    }
}
