//! Walmart search results adapter

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

use super::listing::{ListingSelectorSpec, ListingSelectors};
use super::page::Page;
use super::selectors::{own_attr, SelectorChain};
use super::{ExtractionError, MarketplaceAdapter};
use crate::domain::{CandidateRecord, Marketplace};

static ITEM_ID_IN_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/ip/(?:[^/?#]+/)?(\d{5,})").unwrap_or_else(|e| panic!("invalid item id regex: {e}")));

pub const SEARCH_SELECTORS: ListingSelectorSpec = ListingSelectorSpec {
    containers: &[
        "div[data-item-id]",
        "[data-testid='list-view'] > div",
        "div.search-result-gridview-item-wrapper",
        "li.search-result-listview-item",
    ],
    title: &[
        "span[data-automation-id='product-title']",
        "a[link-identifier] span.w_iUH7",
        "a.product-title-link span",
        ".search-result-product-title",
    ],
    price: &[
        "div[data-automation-id='product-price'] div[aria-hidden='true']",
        "div[data-automation-id='product-price'] span.w_iUH7",
        "div[data-automation-id='product-price']",
        ".price-main .visuallyhidden",
        "span.price-group",
    ],
    brand: &[
        "div[data-automation-id='product-brand']",
        "span[data-automation-id='product-brand']",
        ".search-result-product-brand",
    ],
    link: &["a[link-identifier][href]", "a[href*='/ip/']", "a.product-title-link[href]"],
    image: &["img[data-testid='productTileImage']", "img.absolute", "img"],
    rating: &[
        "[data-testid='product-ratings']",
        "span.stars-container",
        ".stars-reviews",
    ],
    review_count: &["span[data-testid='product-reviews']", "span.sans-serif.gray.f7", ".stars-reviews-count"],
    shipping: &[
        "div[data-automation-id='fulfillment-badge']",
        "[data-automation-id='fulfillment-badge-shipping']",
        ".fulfillment-shipping-text",
    ],
};

pub struct WalmartAdapter {
    selectors: ListingSelectors,
    landmarks: SelectorChain,
}

impl WalmartAdapter {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            selectors: ListingSelectors::compile(&SEARCH_SELECTORS)?,
            landmarks: SelectorChain::compile(
                "walmart_landmarks",
                &["[data-testid='list-view']", "div[data-stack-index]", "#searchProductResult"],
            )?,
        })
    }
}

pub fn item_id_for(element: ElementRef<'_>, link: Option<&str>) -> Option<String> {
    own_attr(element, "data-item-id").or_else(|| link.and_then(item_id_from_url))
}

pub fn item_id_from_url(url: &str) -> Option<String> {
    ITEM_ID_IN_URL_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl MarketplaceAdapter for WalmartAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Walmart
    }

    fn can_handle_page(&self, page: &Page, document: &Html) -> bool {
        if page.marketplace() != Some(Marketplace::Walmart) {
            return false;
        }
        page.url.path().starts_with("/search") || self.landmarks.matches_document(document)
    }

    fn container_selector_count(&self) -> usize {
        self.selectors.containers.len()
    }

    fn find_candidate_elements<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        self.selectors
            .containers
            .select_first_non_empty(document)
            .unwrap_or_default()
    }

    fn extract_candidate(&self, element: ElementRef<'_>, position: usize, page: &Page) -> Option<CandidateRecord> {
        let fields = self.selectors.read(element, page);
        let title = fields.title?;
        let price = fields.price?;

        let mut candidate = CandidateRecord::new(Marketplace::Walmart, title, Some(price.value));
        candidate.price_confidence = Some(price.confidence);
        candidate.item_id = item_id_for(element, fields.link.as_deref());
        candidate.brand = fields.brand;
        candidate.image_url = fields.image_url;
        candidate.ratings = fields.ratings;
        candidate.shipping_price = fields.shipping_price;
        candidate.page_url = fields.link.unwrap_or_default();
        candidate.position = position;
        candidate.resolve_product_id();
        Some(candidate)
    }
}
