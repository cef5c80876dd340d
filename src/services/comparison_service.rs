//! Comparison entry points
//!
//! The only part of the engine that talks to external collaborators: the
//! remote marketplace-data API, sandboxed page loads and durable storage.
//! Everything below it (adapters, scorer, match finder) stays pure.

use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{CandidateRecord, CategoryPageResult, ComparisonResult, Marketplace, MatchResult, ProductRecord};
use crate::error::{ResolutionError, ResolutionResult};
use crate::extraction::{AdapterRegistry, Page};
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::config::{AppConfig, ConfigManager, SharedConfig};
use crate::infrastructure::remote_api::{MultiSearchRequest, ProductSearchApi, RemoteApiClient, SearchRequest};
use crate::infrastructure::sandbox::{with_sandbox, HttpSandboxFactory, SandboxFactory, SandboxHandle};
use crate::infrastructure::storage::{DurableStore, JsonFileStore};
use crate::matching::batch_matcher::{CategoryBatchMatcher, ProgressCallback};
use crate::matching::match_finder::{MatchFinder, MatchOutcome, PageScan};
use crate::services::cache_service::CacheService;
use crate::services::profit_calculator::ProfitCalculator;

const STORE_FILE_NAME: &str = "resale_scout_store.json";

pub struct ComparisonService {
    config: SharedConfig,
    registry: Arc<AdapterRegistry>,
    cache: CacheService,
    api: Arc<dyn ProductSearchApi>,
    sandboxes: Arc<dyn SandboxFactory>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl ComparisonService {
    pub fn new(
        config: SharedConfig,
        registry: Arc<AdapterRegistry>,
        api: Arc<dyn ProductSearchApi>,
        sandboxes: Arc<dyn SandboxFactory>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        Self::with_clock(config, registry, api, sandboxes, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SharedConfig,
        registry: Arc<AdapterRegistry>,
        api: Arc<dyn ProductSearchApi>,
        sandboxes: Arc<dyn SandboxFactory>,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = CacheService::with_clock(config.clone(), store.clone(), clock.clone());
        Self {
            config,
            registry,
            cache,
            api,
            sandboxes,
            store,
            clock,
        }
    }

    /// Production wiring: remote API client, HTTP sandboxes and the JSON store
    pub fn from_config(config: AppConfig) -> ResolutionResult<Self> {
        let registry = AdapterRegistry::with_defaults().map_err(|e| ResolutionError::Configuration(e.to_string()))?;
        let api = RemoteApiClient::new(&config.remote_api, &config.http)?;
        let sandboxes = HttpSandboxFactory::new(config.http.clone());
        let store_path = match &config.storage.path {
            Some(path) => path.clone(),
            None => default_store_path()?,
        };
        info!("Using durable store at {:?}", store_path);

        Ok(Self::new(
            config.into_shared(),
            Arc::new(registry),
            Arc::new(api),
            Arc::new(sandboxes),
            Arc::new(JsonFileStore::new(store_path)),
        ))
    }

    pub const fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub const fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn store(&self) -> &dyn DurableStore {
        self.store.as_ref()
    }

    async fn match_finder(&self) -> MatchFinder {
        MatchFinder::new(self.registry.clone(), self.config.read().await.matching.clone())
    }

    async fn profit_calculator(&self) -> ProfitCalculator {
        ProfitCalculator::new(self.config.read().await.fees.clone())
    }

    /// Compare `product` against each target marketplace.
    ///
    /// Served from cache when a fresh result covers every target. Otherwise
    /// each marketplace is looked up through the remote API; a marketplace
    /// whose lookup fails is listed in `failures` while the others keep their
    /// matches. Fails only when every lookup failed.
    pub async fn compare(&self, product: &ProductRecord, targets: &[Marketplace]) -> ResolutionResult<ComparisonResult> {
        let targets: Vec<Marketplace> = targets
            .iter()
            .copied()
            .filter(|m| *m != product.marketplace)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let key = self.cache.key_for(product).await;
        if let Some(cached) = self.cache.get::<ComparisonResult>(&key).await {
            if targets.iter().all(|m| cached.matched_products.contains_key(m)) {
                info!("Serving comparison for '{}' from cache", product.title);
                return Ok(cached);
            }
            debug!("Cached comparison for '{}' does not cover every target", product.title);
        }

        let finder = self.match_finder().await;
        let calculator = self.profit_calculator().await;
        let request = SearchRequest::for_product(product);

        let lookups = targets.iter().map(|&marketplace| {
            let request = &request;
            async move { (marketplace, self.api.search_marketplace(marketplace, request).await) }
        });
        let responses = join_all(lookups).await;

        let mut result = ComparisonResult::new(product.clone(), self.clock.now());
        let mut first_error = None;
        for (marketplace, response) in responses {
            let candidates = match response {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("Lookup on {} failed for '{}': {}", marketplace, product.title, e);
                    result.failures.insert(marketplace, e.to_string());
                    first_error.get_or_insert(e);
                    continue;
                }
            };

            let matches = rank_and_price(&finder, &calculator, product, marketplace, candidates);
            result.matched_products.insert(marketplace, matches);
        }

        if result.matched_products.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        if result.failures.is_empty() {
            if let Err(e) = self.cache.set(&key, &result).await {
                warn!("Failed to cache comparison for '{}': {}", product.title, e);
            }
        }
        info!(
            "Compared '{}': {} matches across {} marketplaces, {} failed",
            product.title,
            result.total_matches(),
            result.matched_products.len(),
            result.failures.len()
        );
        Ok(result)
    }

    /// Compare through the API's multi-marketplace search in one round trip.
    ///
    /// `selected` narrows the lookup to one marketplace. The lookup succeeds or
    /// fails as a whole, and the result is not cached.
    pub async fn compare_multi(
        &self,
        product: &ProductRecord,
        selected: Option<Marketplace>,
    ) -> ResolutionResult<ComparisonResult> {
        let request = MultiSearchRequest::for_product(product, selected);
        let found = self.api.search_multi(&request).await?;

        let finder = self.match_finder().await;
        let calculator = self.profit_calculator().await;
        let mut result = ComparisonResult::new(product.clone(), self.clock.now());
        for (marketplace, candidates) in found {
            if marketplace == product.marketplace {
                continue;
            }
            let matches = rank_and_price(&finder, &calculator, product, marketplace, candidates);
            result.matched_products.insert(marketplace, matches);
        }
        info!(
            "Multi-search for '{}': {} matches across {} marketplaces",
            product.title,
            result.total_matches(),
            result.matched_products.len()
        );
        Ok(result)
    }

    /// Run the match finder on an already loaded results page and price the matches
    pub async fn compare_on_page(&self, product: &ProductRecord, page: Page) -> ResolutionResult<MatchOutcome> {
        let finder = self.match_finder().await;
        let calculator = self.profit_calculator().await;
        let seconds = self.config.read().await.batch.extraction_timeout_seconds;
        let url = page.url.to_string();

        let source = product.clone();
        let task = tokio::task::spawn_blocking(move || finder.find_matches(&source, &page));
        let mut outcome = match timeout(Duration::from_secs(seconds), task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => return Err(ResolutionError::Task(join_error.to_string())),
            Err(_) => return Err(ResolutionError::ExtractionTimeout { url, seconds }),
        };

        calculator.annotate(product, &mut outcome.all_matches);
        if let Some(best) = outcome.best_match.as_mut() {
            calculator.annotate(product, std::slice::from_mut(best));
        }
        Ok(outcome)
    }

    /// Load `url` in a throwaway sandbox, bounded by the load timeout
    pub async fn load_page(&self, url: &Url) -> ResolutionResult<Page> {
        let seconds = self.config.read().await.batch.load_timeout_seconds;
        with_sandbox(self.sandboxes.as_ref(), url, move |sandbox| {
            Box::pin(async move { load_with_timeout(sandbox, None, seconds).await })
        })
        .await
    }

    /// Candidates on a results page, unscored
    pub async fn scan_page(&self, page: Page) -> ResolutionResult<PageScan> {
        let finder = self.match_finder().await;
        tokio::task::spawn_blocking(move || finder.scan_page(&page))
            .await
            .map_err(|e| ResolutionError::Task(e.to_string()))?
    }

    /// Resolve a list of source products against one marketplace, unattended
    pub async fn run_category_batch(
        &self,
        products: &[ProductRecord],
        target: Marketplace,
        progress: Option<ProgressCallback<'_>>,
        cancel: &CancellationToken,
    ) -> ResolutionResult<CategoryPageResult> {
        let batch_config = self.config.read().await.batch.clone();
        let matcher = CategoryBatchMatcher::new(
            self.match_finder().await,
            self.sandboxes.clone(),
            self.store.clone(),
            batch_config,
        )
        .with_profit_calculator(self.profit_calculator().await);
        matcher.run(products, target, progress, cancel).await
    }

    /// Source products listed on a category page, following continuation
    /// pages up to `max_scroll_pages`. Products are deduplicated by identity.
    pub async fn scan_category_page(&self, url: &Url) -> ResolutionResult<Vec<ProductRecord>> {
        let batch = self.config.read().await.batch.clone();
        let registry = self.registry.clone();

        with_sandbox(self.sandboxes.as_ref(), url, move |sandbox| {
            Box::pin(async move {
                let mut products = Vec::new();
                let mut seen = HashSet::new();
                let mut page = load_with_timeout(sandbox, None, batch.load_timeout_seconds).await?;

                for page_index in 0..=batch.max_scroll_pages {
                    let (found, next) = read_category_page(&registry, &page)?;
                    let before = products.len();
                    for product in found {
                        if seen.insert((product.marketplace, product.product_id.clone())) {
                            products.push(product);
                        }
                    }
                    debug!("Category page {} added {} products", page_index, products.len() - before);

                    let Some(next) = next.filter(|_| page_index < batch.max_scroll_pages) else {
                        break;
                    };
                    page = load_with_timeout(sandbox, Some(&next), batch.load_timeout_seconds).await?;
                }
                Ok(products)
            })
        })
        .await
    }

    /// Source products on one loaded category page, without continuation
    pub fn products_from_category_page(&self, page: &Page) -> ResolutionResult<Vec<ProductRecord>> {
        read_category_page(&self.registry, page).map(|(products, _)| products)
    }

    pub async fn clear_cache(&self) -> ResolutionResult<usize> {
        self.cache.clear().await
    }
}

/// Score API candidates, keep those above the threshold and price them
fn rank_and_price(
    finder: &MatchFinder,
    calculator: &ProfitCalculator,
    product: &ProductRecord,
    marketplace: Marketplace,
    candidates: Vec<CandidateRecord>,
) -> Vec<MatchResult> {
    let search_url = marketplace
        .search_url(&product.search_query())
        .map(String::from)
        .unwrap_or_default();
    let min_similarity = finder.config().min_similarity;
    let mut matches: Vec<_> = finder
        .rank_candidates(product, marketplace, candidates, &search_url)
        .unwrap_or_default()
        .into_iter()
        .filter(|m| m.similarity_score >= min_similarity)
        .collect();
    calculator.annotate(product, &mut matches);
    debug!("{} matches for '{}' on {}", matches.len(), product.title, marketplace);
    matches
}

/// Products on the page plus the continuation URL, if any. The parsed DOM
/// never outlives this call.
fn read_category_page(registry: &AdapterRegistry, page: &Page) -> ResolutionResult<(Vec<ProductRecord>, Option<Url>)> {
    let document = page.document();
    let adapter = registry
        .resolve_category_page(page, &document)
        .ok_or_else(|| ResolutionError::NoMatcherForPage {
            url: page.url.to_string(),
        })?;
    let next = adapter.prepare_page(page, &document);
    Ok((adapter.extract_products(page), next))
}

async fn load_with_timeout(sandbox: &mut SandboxHandle, next: Option<&Url>, seconds: u64) -> ResolutionResult<Page> {
    let url = next.map_or_else(|| sandbox.url().to_string(), Url::to_string);
    let load = async {
        match next {
            Some(next) => sandbox.navigate(next).await,
            None => sandbox.wait_for_load().await,
        }
    };
    timeout(Duration::from_secs(seconds), load)
        .await
        .map_err(|_| ResolutionError::LoadTimeout { url, seconds })?
}

fn default_store_path() -> ResolutionResult<PathBuf> {
    ConfigManager::get_app_data_dir()
        .map(|dir| dir.join(STORE_FILE_NAME))
        .map_err(|e| ResolutionError::Configuration(e.to_string()))
}
