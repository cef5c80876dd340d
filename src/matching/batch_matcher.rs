//! Category batch matcher
//!
//! Resolves a list of source products against one target marketplace without
//! supervision. Products are processed strictly one after another; each gets
//! its own sandboxed context at the target's search URL, which is destroyed
//! before the next product starts. A per-product record is appended whatever
//! happened, and the whole run is persisted once the queue drains.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{BatchProductResult, CategoryPageResult, Marketplace, ProductRecord};
use crate::error::{ResolutionError, ResolutionResult};
use crate::extraction::Page;
use crate::infrastructure::config::BatchConfig;
use crate::infrastructure::sandbox::{with_sandbox, SandboxFactory, SandboxHandle};
use crate::infrastructure::storage::{DurableStore, StoreEntries};
use crate::matching::match_finder::{MatchFinder, MatchOutcome};
use crate::services::profit_calculator::ProfitCalculator;

/// Durable key prefix of persisted batch runs
pub const BATCH_KEY_PREFIX: &str = "batch_";

/// Reported to the caller after every product
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
    pub current_product: String,
    pub matches_found: usize,
}

pub type ProgressCallback<'a> = &'a (dyn Fn(&BatchProgress) + Send + Sync);

pub struct CategoryBatchMatcher {
    finder: MatchFinder,
    sandboxes: Arc<dyn SandboxFactory>,
    store: Arc<dyn DurableStore>,
    config: BatchConfig,
    profit: Option<ProfitCalculator>,
}

impl CategoryBatchMatcher {
    pub fn new(
        finder: MatchFinder,
        sandboxes: Arc<dyn SandboxFactory>,
        store: Arc<dyn DurableStore>,
        config: BatchConfig,
    ) -> Self {
        Self {
            finder,
            sandboxes,
            store,
            config,
            profit: None,
        }
    }

    /// Annotate kept matches with resale profit
    #[must_use]
    pub fn with_profit_calculator(mut self, calculator: ProfitCalculator) -> Self {
        self.profit = Some(calculator);
        self
    }

    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every product in order and persist the accumulated results.
    ///
    /// Cancellation is only observed between products; the product in flight
    /// always completes (or times out) and is recorded.
    pub async fn run(
        &self,
        products: &[ProductRecord],
        target: Marketplace,
        progress: Option<ProgressCallback<'_>>,
        cancel: &CancellationToken,
    ) -> ResolutionResult<CategoryPageResult> {
        let mut result = CategoryPageResult::new(target, Utc::now());
        let total = products.len();
        let batch_size = self.config.batch_size.max(1);
        info!(
            "🚀 Batch {} started: {} products against {} in batches of {}",
            result.run_id, total, target, batch_size
        );

        'batches: for (batch_index, batch) in products.chunks(batch_size).enumerate() {
            for (index, product) in batch.iter().enumerate() {
                let delay_ms = match (batch_index, index) {
                    (0, 0) => 0,
                    (_, 0) => self.config.batch_delay_ms,
                    _ => self.config.product_delay_ms,
                };
                if !self.pause(delay_ms, cancel).await {
                    warn!("Batch {} cancelled after {} of {} products", result.run_id, result.products.len(), total);
                    result.cancelled = true;
                    break 'batches;
                }

                let record = self.process_product(product, target).await;
                let matches_found = record.matches.len();
                result.products.push(record);

                if let Some(report) = progress {
                    let completed = result.products.len();
                    report(&BatchProgress {
                        completed,
                        total,
                        percentage: completed as f64 / total as f64 * 100.0,
                        current_product: product.title.clone(),
                        matches_found,
                    });
                }
            }
        }

        result.finished_at = Some(Utc::now());
        info!(
            "✅ Batch {} finished: {}/{} products matched",
            result.run_id,
            result.matched_count(),
            result.products.len()
        );

        if let Err(e) = self.persist(&result).await {
            error!("Failed to persist batch {}: {}", result.run_id, e);
        }
        Ok(result)
    }

    /// Sleep unless cancelled; `false` when the run should stop
    async fn pause(&self, delay_ms: u64, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if delay_ms == 0 {
            return true;
        }
        tokio::select! {
            () = cancel.cancelled() => false,
            () = sleep(Duration::from_millis(delay_ms)) => true,
        }
    }

    /// Resolve one product; never fails, errors are recorded on the result.
    /// Setup failures (configuration, storage) are recorded too but logged at error level
    pub async fn process_product(&self, product: &ProductRecord, target: Marketplace) -> BatchProductResult {
        let query = product.search_query();
        let search_url = match target.search_url(&query) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build {} search URL for '{}': {}", target, query, e);
                return BatchProductResult {
                    source_product: product.clone(),
                    matches: Vec::new(),
                    search_url: String::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        let finder = self.finder.clone();
        let source = product.clone();
        let load_seconds = self.config.load_timeout_seconds;
        let extraction_seconds = self.config.extraction_timeout_seconds;
        let resolved = with_sandbox(self.sandboxes.as_ref(), &search_url, move |sandbox| {
            Box::pin(async move {
                let page = load_page(sandbox, load_seconds).await?;
                extract_matches(finder, source, page, target, extraction_seconds).await
            })
        })
        .await;

        let mut record = BatchProductResult {
            source_product: product.clone(),
            matches: Vec::new(),
            search_url: search_url.to_string(),
            error: None,
        };
        match resolved {
            Ok(outcome) => {
                if let Some(e) = &outcome.error {
                    info!("No matches for '{}' on {}: {}", product.title, target, e);
                    record.error = Some(e.to_string());
                }
                record.matches = outcome
                    .all_matches
                    .into_iter()
                    .filter(|m| m.similarity_score >= self.config.batch_min_similarity)
                    .take(self.config.batch_max_matches)
                    .collect();
                if let Some(calculator) = &self.profit {
                    calculator.annotate(product, &mut record.matches);
                }
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!("Product '{}' timed out on {}: {}", product.title, target, e);
                } else if e.is_per_product() {
                    warn!("Product '{}' failed on {}: {}", product.title, target, e);
                } else {
                    error!("Batch setup failure while processing '{}' on {}: {}", product.title, target, e);
                }
                record.error = Some(e.to_string());
            }
        }
        record
    }

    async fn persist(&self, result: &CategoryPageResult) -> ResolutionResult<()> {
        let value = serde_json::to_value(result)
            .map_err(|e| ResolutionError::Storage(format!("failed to serialize batch result: {e}")))?;
        let mut entries = StoreEntries::new();
        entries.insert(batch_key(result.run_id), value);
        self.store.set(entries).await
    }
}

pub fn batch_key(run_id: Uuid) -> String {
    format!("{BATCH_KEY_PREFIX}{run_id}")
}

/// Previously persisted batch run
pub async fn load_batch(store: &dyn DurableStore, run_id: Uuid) -> ResolutionResult<Option<CategoryPageResult>> {
    let key = batch_key(run_id);
    let mut found = store.get(std::slice::from_ref(&key)).await?;
    found
        .remove(&key)
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|e| ResolutionError::Storage(format!("stored batch {run_id} is unreadable: {e}")))
        })
        .transpose()
}

async fn load_page(sandbox: &mut SandboxHandle, seconds: u64) -> ResolutionResult<Page> {
    let url = sandbox.url().to_string();
    timeout(Duration::from_secs(seconds), sandbox.wait_for_load())
        .await
        .map_err(|_| ResolutionError::LoadTimeout { url, seconds })?
}

/// Run the (synchronous) match finder off the async workers, bounded in time
async fn extract_matches(
    finder: MatchFinder,
    source: ProductRecord,
    page: Page,
    target: Marketplace,
    seconds: u64,
) -> ResolutionResult<MatchOutcome> {
    let url = page.url.to_string();
    let task = tokio::task::spawn_blocking(move || finder.find_matches_with(&source, &page, target));
    match timeout(Duration::from_secs(seconds), task).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(join_error)) => Err(ResolutionError::Task(join_error.to_string())),
        Err(_) => Err(ResolutionError::ExtractionTimeout { url, seconds }),
    }
}
