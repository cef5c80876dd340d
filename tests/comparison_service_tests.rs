//! Comparison service against fake API, sandbox and store collaborators
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use url::Url;
use uuid::Uuid;

use resale_scout::domain::{CandidateRecord, Marketplace, ProductRecord};
use resale_scout::error::{ResolutionError, ResolutionResult};
use resale_scout::extraction::{AdapterRegistry, Page};
use resale_scout::infrastructure::config::AppConfig;
use resale_scout::infrastructure::remote_api::{MultiSearchRequest, ProductSearchApi, SearchRequest};
use resale_scout::infrastructure::sandbox::{Sandbox, SandboxFactory, SandboxHandle};
use resale_scout::infrastructure::storage::MemoryStore;
use resale_scout::services::ComparisonService;

/// Canned API responses per marketplace; a missing entry is a failed lookup
#[derive(Default)]
struct FakeApi {
    responses: HashMap<Marketplace, Vec<CandidateRecord>>,
    calls: AtomicUsize,
}

#[async_trait]
impl ProductSearchApi for FakeApi {
    async fn search_marketplace(&self, marketplace: Marketplace, _request: &SearchRequest) -> ResolutionResult<Vec<CandidateRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(&marketplace)
            .cloned()
            .ok_or_else(|| ResolutionError::RemoteApiFailure {
                marketplace,
                message: "upstream unavailable".into(),
            })
    }

    async fn search_multi(&self, request: &MultiSearchRequest) -> ResolutionResult<BTreeMap<Marketplace, Vec<CandidateRecord>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .iter()
            .filter(|(marketplace, _)| request.selected_marketplace.is_none_or(|selected| selected == **marketplace))
            .map(|(marketplace, candidates)| (*marketplace, candidates.clone()))
            .collect())
    }
}

/// Serves pages by exact URL
#[derive(Default)]
struct PageFactory {
    pages: HashMap<String, String>,
    opened: AtomicUsize,
    destroyed: Arc<AtomicUsize>,
}

struct PageSandbox {
    id: Uuid,
    url: Url,
    pages: HashMap<String, String>,
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl Sandbox for PageSandbox {
    fn id(&self) -> Uuid {
        self.id
    }

    fn url(&self) -> &Url {
        &self.url
    }

    async fn wait_for_load(&mut self) -> ResolutionResult<Page> {
        self.pages
            .get(self.url.as_str())
            .map(|html| Page::new(self.url.clone(), html.clone()))
            .ok_or_else(|| ResolutionError::Http {
                status: 404,
                message: "Not Found".into(),
                url: self.url.to_string(),
            })
    }

    async fn navigate(&mut self, url: &Url) -> ResolutionResult<Page> {
        self.url = url.clone();
        self.wait_for_load().await
    }

    async fn destroy(self: Box<Self>) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SandboxFactory for PageFactory {
    async fn open(&self, url: &Url) -> ResolutionResult<SandboxHandle> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(PageSandbox {
            id: Uuid::new_v4(),
            url: url.clone(),
            pages: self.pages.clone(),
            destroyed: Arc::clone(&self.destroyed),
        }))
    }
}

fn acme_widget() -> ProductRecord {
    let mut product = ProductRecord::new(Marketplace::Amazon, "B0SRC00001", "Acme Widget").with_brand("Acme");
    product.price = Some(Decimal::TEN);
    product
}

fn candidate(marketplace: Marketplace, title: &str, price: i64, brand: Option<&str>) -> CandidateRecord {
    let mut candidate = CandidateRecord::new(marketplace, title, Some(Decimal::new(price, 0)));
    candidate.brand = brand.map(String::from);
    candidate.product_id = format!("{marketplace}-{}", title.len());
    candidate
}

fn service(api: Arc<FakeApi>, sandboxes: Arc<PageFactory>) -> ComparisonService {
    ComparisonService::new(
        AppConfig::default().into_shared(),
        Arc::new(AdapterRegistry::with_defaults().unwrap()),
        api,
        sandboxes,
        Arc::new(MemoryStore::new()),
    )
}

#[tokio::test]
async fn test_acme_widget_matches_pro_with_positive_profit() {
    let mut api = FakeApi::default();
    api.responses.insert(
        Marketplace::Walmart,
        vec![
            candidate(Marketplace::Walmart, "Acme Widget Pro", 15, Some("Acme")),
            candidate(Marketplace::Walmart, "Garden Hose 50ft", 12, None),
        ],
    );
    let service = service(Arc::new(api), Arc::new(PageFactory::default()));

    let result = service.compare(&acme_widget(), &[Marketplace::Walmart]).await.unwrap();

    let matches = &result.matched_products[&Marketplace::Walmart];
    assert_eq!(matches.len(), 1);
    let best = &matches[0];
    assert_eq!(best.candidate.title, "Acme Widget Pro");
    assert!(best.similarity_score >= 0.6);
    let profit = best.profit.unwrap();
    assert_eq!(profit.amount, Decimal::new(275, 2));
    assert!(profit.amount > Decimal::ZERO);
    assert_eq!(best.fee_breakdown.as_ref().unwrap().marketplace_fee_amount, Decimal::new(225, 2));
    assert!(result.failures.is_empty());
}

#[tokio::test]
async fn test_partial_failure_keeps_sibling_results_and_skips_cache() {
    let mut api = FakeApi::default();
    api.responses.insert(
        Marketplace::Walmart,
        vec![candidate(Marketplace::Walmart, "Acme Widget Pro", 15, Some("Acme"))],
    );
    let api = Arc::new(api);
    let service = service(Arc::clone(&api), Arc::new(PageFactory::default()));
    let targets = [Marketplace::Walmart, Marketplace::Target];

    let result = service.compare(&acme_widget(), &targets).await.unwrap();
    assert_eq!(result.matched_products[&Marketplace::Walmart].len(), 1);
    assert!(result.failures[&Marketplace::Target].contains("upstream unavailable"));

    service.compare(&acme_widget(), &targets).await.unwrap();
    assert_eq!(api.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_full_success_is_served_from_cache() {
    let mut api = FakeApi::default();
    api.responses.insert(
        Marketplace::Walmart,
        vec![candidate(Marketplace::Walmart, "Acme Widget Pro", 15, Some("Acme"))],
    );
    api.responses.insert(Marketplace::Target, Vec::new());
    let api = Arc::new(api);
    let service = service(Arc::clone(&api), Arc::new(PageFactory::default()));
    // the source marketplace is never a target
    let targets = [Marketplace::Walmart, Marketplace::Target, Marketplace::Amazon];

    let first = service.compare(&acme_widget(), &targets).await.unwrap();
    let second = service.compare(&acme_widget(), &targets).await.unwrap();

    assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(first.total_matches(), second.total_matches());
    assert!(!first.matched_products.contains_key(&Marketplace::Amazon));
    assert_eq!(service.cache().memory_len().await, 1);

    assert_eq!(service.clear_cache().await.unwrap(), 1);
    service.compare(&acme_widget(), &targets).await.unwrap();
    assert_eq!(api.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_every_lookup_failing_is_an_error() {
    let service = service(Arc::new(FakeApi::default()), Arc::new(PageFactory::default()));

    let err = service
        .compare(&acme_widget(), &[Marketplace::Walmart, Marketplace::HomeDepot])
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::RemoteApiFailure { .. }));
}

#[tokio::test]
async fn test_multi_search_ranks_every_returned_marketplace() {
    let mut api = FakeApi::default();
    api.responses.insert(
        Marketplace::Walmart,
        vec![candidate(Marketplace::Walmart, "Acme Widget Pro", 15, Some("Acme"))],
    );
    api.responses.insert(
        Marketplace::Target,
        vec![candidate(Marketplace::Target, "Acme Widget", 11, Some("Acme"))],
    );
    api.responses.insert(
        Marketplace::Amazon,
        vec![candidate(Marketplace::Amazon, "Acme Widget", 10, Some("Acme"))],
    );
    let service = service(Arc::new(api), Arc::new(PageFactory::default()));

    let all = service.compare_multi(&acme_widget(), None).await.unwrap();
    assert_eq!(all.matched_products.len(), 2);
    assert!(!all.matched_products.contains_key(&Marketplace::Amazon));

    let target_only = service
        .compare_multi(&acme_widget(), Some(Marketplace::Target))
        .await
        .unwrap();
    assert_eq!(target_only.matched_products.keys().copied().collect::<Vec<_>>(), vec![Marketplace::Target]);
}

const BROWSE_PAGE_ONE: &str = r#"
    <html><body><div class="s-main-slot">
      <div data-component-type="s-search-result" data-asin="B0SRC00001">
        <h2><a href="/dp/B0SRC00001"><span>Acme Widget</span></a></h2>
        <span class="a-price"><span class="a-offscreen">$10.00</span></span>
      </div>
      <div data-component-type="s-search-result" data-asin="B0SRC00002">
        <h2><a href="/dp/B0SRC00002"><span>Acme Sprocket</span></a></h2>
      </div>
    </div>
    <a class="s-pagination-next" href="/s?rh=n%3A1234&page=2">Next</a>
    </body></html>"#;

const BROWSE_PAGE_TWO: &str = r#"
    <html><body><div class="s-main-slot">
      <div data-component-type="s-search-result" data-asin="B0SRC00002">
        <h2><a href="/dp/B0SRC00002"><span>Acme Sprocket</span></a></h2>
      </div>
      <div data-component-type="s-search-result" data-asin="B0SRC00003">
        <h2><a href="/dp/B0SRC00003"><span>Acme Gear Set</span></a></h2>
        <span class="a-price"><span class="a-offscreen">$24.50</span></span>
      </div>
    </div>
    </body></html>"#;

#[tokio::test]
async fn test_category_scan_follows_continuation_and_dedups() {
    let mut factory = PageFactory::default();
    factory
        .pages
        .insert("https://www.amazon.com/s?rh=n%3A1234".into(), BROWSE_PAGE_ONE.into());
    factory
        .pages
        .insert("https://www.amazon.com/s?rh=n%3A1234&page=2".into(), BROWSE_PAGE_TWO.into());
    let factory = Arc::new(factory);
    let service = service(Arc::new(FakeApi::default()), Arc::clone(&factory));

    let url = Url::parse("https://www.amazon.com/s?rh=n%3A1234").unwrap();
    let products = service.scan_category_page(&url).await.unwrap();

    let ids: Vec<&str> = products.iter().map(|p| p.product_id.as_str()).collect();
    assert_eq!(ids, vec!["B0SRC00001", "B0SRC00002", "B0SRC00003"]);
    assert_eq!(products[2].price, Some(Decimal::new(2450, 2)));
    assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
    assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_category_scan_releases_sandbox_on_failure() {
    let factory = Arc::new(PageFactory::default());
    let service = service(Arc::new(FakeApi::default()), Arc::clone(&factory));

    let url = Url::parse("https://www.amazon.com/s?rh=n%3A9999").unwrap();
    let err = service.scan_category_page(&url).await.unwrap_err();

    assert!(matches!(err, ResolutionError::Http { status: 404, .. }));
    assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_compare_on_page_prices_best_match() {
    let service = service(Arc::new(FakeApi::default()), Arc::new(PageFactory::default()));
    let page = Page::parse(
        "https://www.walmart.com/search?q=Acme+Widget",
        r#"<div data-item-id="222">
             <span data-automation-id="product-title">Acme Widget Pro</span>
             <div data-automation-id="product-price"><span class="w_iUH7">$15.00</span></div>
           </div>"#,
    )
    .unwrap();

    let outcome = service.compare_on_page(&acme_widget(), page).await.unwrap();

    assert!(outcome.success);
    let best = outcome.best_match.unwrap();
    assert_eq!(best.candidate.item_id.as_deref(), Some("222"));
    assert!(best.profit.unwrap().amount > Decimal::ZERO);
    assert!(outcome.all_matches.iter().all(|m| m.profit.is_some()));
}
