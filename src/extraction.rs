//! Marketplace extraction layer
//!
//! One adapter per marketplace turns listing markup into [`CandidateRecord`]s.
//! Adapters only read the page; every lookup goes through ordered selector
//! chains so a layout change on one cohort degrades to a legacy selector
//! instead of failing outright.

pub mod amazon;
pub mod category;
pub mod home_depot;
pub mod listing;
pub mod page;
pub mod price;
pub mod selectors;
pub mod target;
pub mod walmart;

pub use amazon::AmazonAdapter;
pub use category::{AmazonCategoryAdapter, CategoryPageAdapter, WalmartCategoryAdapter};
pub use home_depot::HomeDepotAdapter;
pub use page::Page;
pub use price::{PriceConfidence, PriceParse};
pub use selectors::SelectorChain;
pub use target::TargetAdapter;
pub use walmart::WalmartAdapter;

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::{CandidateRecord, Marketplace};
use crate::matching::similarity::{title_similarity, TitleSimilarityOptions};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("No valid selectors in chain '{chain}': {errors}")]
    NoValidSelectors { chain: String, errors: String },
}

/// Per-marketplace capability set used by the match finder
pub trait MarketplaceAdapter: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    /// URL host plus structural landmarks of a search results page
    fn can_handle_page(&self, page: &Page, document: &Html) -> bool;

    /// Number of container selectors tried, for diagnostics
    fn container_selector_count(&self) -> usize;

    /// Result tiles from the first container selector that matches anything
    fn find_candidate_elements<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>>;

    /// `None` when the tile has no usable title or price
    fn extract_candidate(&self, element: ElementRef<'_>, position: usize, page: &Page) -> Option<CandidateRecord>;

    /// Shared scorer by default; an adapter may override to inject marketplace synonyms
    fn compute_similarity_of_titles(&self, a: &str, b: &str, options: &TitleSimilarityOptions) -> f64 {
        title_similarity(a, b, options)
    }

    fn search_url(&self, query: &str) -> Result<Url, url::ParseError> {
        self.marketplace().search_url(query)
    }
}

/// Search and category adapters keyed by marketplace
pub struct AdapterRegistry {
    search: BTreeMap<Marketplace, Box<dyn MarketplaceAdapter>>,
    category: BTreeMap<Marketplace, Box<dyn CategoryPageAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self {
            search: BTreeMap::new(),
            category: BTreeMap::new(),
        }
    }

    /// Registry with every built-in adapter
    pub fn with_defaults() -> Result<Self, ExtractionError> {
        let mut registry = Self::empty();
        registry.register(Box::new(AmazonAdapter::new()?));
        registry.register(Box::new(WalmartAdapter::new()?));
        registry.register(Box::new(TargetAdapter::new()?));
        registry.register(Box::new(HomeDepotAdapter::new()?));
        registry.register_category(Box::new(AmazonCategoryAdapter::new()?));
        registry.register_category(Box::new(WalmartCategoryAdapter::new()?));
        Ok(registry)
    }

    /// Replaces any adapter already registered for the same marketplace
    pub fn register(&mut self, adapter: Box<dyn MarketplaceAdapter>) {
        self.search.insert(adapter.marketplace(), adapter);
    }

    pub fn register_category(&mut self, adapter: Box<dyn CategoryPageAdapter>) {
        self.category.insert(adapter.marketplace(), adapter);
    }

    pub fn get(&self, marketplace: Marketplace) -> Option<&dyn MarketplaceAdapter> {
        self.search.get(&marketplace).map(AsRef::as_ref)
    }

    pub fn marketplaces(&self) -> impl Iterator<Item = Marketplace> + '_ {
        self.search.keys().copied()
    }

    /// The adapter for the page's own marketplace is asked first, then the rest
    pub fn resolve_for_page(&self, page: &Page, document: &Html) -> Option<&dyn MarketplaceAdapter> {
        let found = page
            .marketplace()
            .and_then(|m| self.get(m))
            .filter(|adapter| adapter.can_handle_page(page, document))
            .or_else(|| {
                self.search
                    .values()
                    .find(|adapter| adapter.can_handle_page(page, document))
                    .map(|adapter| adapter.as_ref())
            });
        if let Some(adapter) = found {
            debug!("Resolved {} adapter for {}", adapter.marketplace(), page.url);
        }
        found
    }

    pub fn resolve_category_page(&self, page: &Page, document: &Html) -> Option<&dyn CategoryPageAdapter> {
        self.category
            .values()
            .map(AsRef::as_ref)
            .find(|adapter| adapter.can_handle_page(page, document))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::empty()
    }
}
