//! Amazon search results adapter

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

use super::listing::{ListingSelectorSpec, ListingSelectors};
use super::page::Page;
use super::selectors::{own_attr, SelectorChain};
use super::{ExtractionError, MarketplaceAdapter};
use crate::domain::{CandidateRecord, Marketplace};

static ASIN_IN_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(?:dp|gp/product|gp/aw/d)/([A-Z0-9]{10})").unwrap_or_else(|e| panic!("invalid ASIN regex: {e}"))
});

/// Search tile layouts, newest first
pub const SEARCH_SELECTORS: ListingSelectorSpec = ListingSelectorSpec {
    containers: &[
        "div[data-component-type='s-search-result'][data-asin]",
        "div.s-result-item[data-asin]:not([data-asin=''])",
        "li.s-result-item[data-asin]",
    ],
    title: &[
        "h2 a span",
        "h2 span",
        "[data-cy='title-recipe'] span",
        "span.a-size-medium.a-color-base.a-text-normal",
        "span.a-size-base-plus.a-color-base.a-text-normal",
        "a.s-access-detail-page h2",
    ],
    price: &[
        ".a-price:not(.a-text-price) .a-offscreen",
        ".a-price:not(.a-text-price) span[aria-hidden='true']",
        "span.a-price",
        ".a-color-price",
        "span.s-price",
    ],
    brand: &[
        "[data-cy='title-recipe'] h2 span.a-size-base-plus.a-color-base",
        "h5 span.a-size-base-plus",
        ".a-row.a-size-base.a-color-secondary > span.a-size-base",
    ],
    link: &[
        "h2 a[href]",
        "[data-cy='title-recipe'] a[href]",
        "a.a-link-normal[href*='/dp/']",
        "a.s-access-detail-page[href]",
    ],
    image: &["img.s-image", "img[data-image-latency]", "img"],
    rating: &[
        "i.a-icon-star-small span.a-icon-alt",
        "i.a-icon-star-mini span.a-icon-alt",
        "span.a-icon-alt",
    ],
    review_count: &[
        "[data-csa-c-content-id*='ratings-count'] span.a-size-base",
        "span.a-size-base.s-underline-text",
        "a[href*='customerReviews'] span",
    ],
    shipping: &["[data-cy='delivery-recipe']", "div.s-align-children-center", ".a-row.s-align-children-center"],
};

pub struct AmazonAdapter {
    selectors: ListingSelectors,
    landmarks: SelectorChain,
}

impl AmazonAdapter {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            selectors: ListingSelectors::compile(&SEARCH_SELECTORS)?,
            landmarks: SelectorChain::compile(
                "amazon_landmarks",
                &["div.s-main-slot", "#search", "span[data-component-type='s-search-results']"],
            )?,
        })
    }
}

/// ASIN from the tile's own attribute, falling back to the product link
pub fn asin_for(element: ElementRef<'_>, link: Option<&str>) -> Option<String> {
    own_attr(element, "data-asin")
        .filter(|asin| asin.len() == 10)
        .or_else(|| link.and_then(asin_from_url))
}

pub fn asin_from_url(url: &str) -> Option<String> {
    ASIN_IN_URL_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl MarketplaceAdapter for AmazonAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Amazon
    }

    fn can_handle_page(&self, page: &Page, document: &Html) -> bool {
        if page.marketplace() != Some(Marketplace::Amazon) {
            return false;
        }
        page.url.path().starts_with("/s") || self.landmarks.matches_document(document)
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

        let mut candidate = CandidateRecord::new(Marketplace::Amazon, title, Some(price.value));
        candidate.price_confidence = Some(price.confidence);
        candidate.asin = asin_for(element, fields.link.as_deref());
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const SEARCH_HTML: &str = r#"
        <html><body><div class="s-main-slot">
          <div data-component-type="s-search-result" data-asin="B0ACME0001">
            <h2><a href="/Acme-Widget-Pro/dp/B0ACME0001/ref=sr_1_1"><span>Acme Widget Pro</span></a></h2>
            <span class="a-price"><span class="a-offscreen">$15.00</span><span aria-hidden="true">$15<span>00</span></span></span>
            <i class="a-icon-star-small"><span class="a-icon-alt">4.5 out of 5 stars</span></i>
            <span class="a-size-base s-underline-text">1,024</span>
            <img class="s-image" src="https://m.media-amazon.com/images/I/acme.jpg">
            <div data-cy="delivery-recipe">FREE delivery Tue, Oct 21</div>
          </div>
          <div data-component-type="s-search-result" data-asin="B0ACME0002">
            <h2><a href="/dp/B0ACME0002"><span>Acme Widget Refill</span></a></h2>
            <span class="a-price"><span class="a-price-whole">7.</span><span class="a-price-fraction">49</span></span>
          </div>
          <div data-component-type="s-search-result" data-asin="B0ACME0003">
            <h2><a href="/dp/B0ACME0003"><span>Currently unavailable</span></a></h2>
          </div>
        </div></body></html>"#;

    fn page() -> Page {
        Page::parse("https://www.amazon.com/s?k=acme+widget", SEARCH_HTML).unwrap()
    }

    #[test]
    fn test_can_handle_amazon_search() {
        let adapter = AmazonAdapter::new().unwrap();
        let page = page();
        assert!(adapter.can_handle_page(&page, &page.document()));

        let other = Page::parse("https://www.walmart.com/search?q=x", SEARCH_HTML).unwrap();
        assert!(!adapter.can_handle_page(&other, &other.document()));
    }

    #[test]
    fn test_extracts_candidates_and_drops_priceless() {
        let adapter = AmazonAdapter::new().unwrap();
        let page = page();
        let document = page.document();
        let elements = adapter.find_candidate_elements(&document);
        assert_eq!(elements.len(), 3);

        let candidates: Vec<_> = elements
            .iter()
            .enumerate()
            .filter_map(|(i, el)| adapter.extract_candidate(*el, i, &page))
            .collect();
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.title, "Acme Widget Pro");
        assert_eq!(first.price, Some(Decimal::new(1500, 2)));
        assert_eq!(first.asin.as_deref(), Some("B0ACME0001"));
        assert_eq!(first.product_id, "B0ACME0001");
        assert_eq!(first.ratings.map(|r| r.count), Some(1024));
        assert_eq!(first.shipping_price, Some(Decimal::ZERO));
        assert!(first.page_url.starts_with("https://www.amazon.com/Acme-Widget-Pro/dp/"));

        assert_eq!(candidates[1].price, Some(Decimal::new(749, 2)));
        assert_eq!(candidates[1].position, 1);
    }

    #[test]
    fn test_asin_from_url() {
        assert_eq!(
            asin_from_url("https://www.amazon.com/gp/product/B00TEST123?th=1").as_deref(),
            Some("B00TEST123")
        );
        assert_eq!(asin_from_url("https://www.amazon.com/s?k=x"), None);
    }
}
