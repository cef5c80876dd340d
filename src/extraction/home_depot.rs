//! Home Depot search results adapter
//!
//! Home Depot renders prices as sibling spans (`$`, dollars, cents) and on
//! some layouts as one digit run with the cents superscripted, which reads back
//! as a bare blob.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

use super::listing::{ListingSelectorSpec, ListingSelectors};
use super::page::Page;
use super::selectors::{own_attr, SelectorChain};
use super::{ExtractionError, MarketplaceAdapter};
use crate::domain::{CandidateRecord, Marketplace};

static SKU_IN_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/p/(?:[^/?#]+/)?(\d{9})").unwrap_or_else(|e| panic!("invalid SKU regex: {e}")));

pub const SEARCH_SELECTORS: ListingSelectorSpec = ListingSelectorSpec {
    containers: &[
        "div[data-testid='product-pod']",
        "div.browse-search__pod",
        "div.plp-pod",
        "div.pod-inner",
    ],
    title: &[
        "span[data-testid='attribute-product-label']",
        "[data-testid='product-header'] span.product-header__title-product--4y7oa",
        "[data-testid='product-header'] h3",
        ".product-pod__title__product",
    ],
    price: &[
        "div[data-testid='price-simple'] .price-format__main-price",
        ".price-format__main-price",
        "div[data-testid='price-simple']",
        ".price__dollars",
    ],
    brand: &[
        "p[data-testid='attribute-brandname-above']",
        "[data-testid='product-header'] .product-header__title__brand--bold--4y7oa",
        ".product-pod__title__brand--bold",
    ],
    link: &["a[data-testid='product-header'][href]", "a.product-pod--ie-fix[href]", "a[href*='/p/']"],
    image: &["img[data-testid='product-image__wrapper']", "img.stretchy", "img"],
    rating: &["[data-testid='ratings']", "span.stars--c43xm", ".product-ratings__stars"],
    review_count: &["span.product-ratings__count", "[data-testid='ratings'] span"],
    shipping: &["[data-testid='fulfillment-delivery']", ".pod-fulfillment__delivery"],
};

pub struct HomeDepotAdapter {
    selectors: ListingSelectors,
    landmarks: SelectorChain,
}

impl HomeDepotAdapter {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            selectors: ListingSelectors::compile(&SEARCH_SELECTORS)?,
            landmarks: SelectorChain::compile(
                "homedepot_landmarks",
                &["div[data-testid='product-pod']", "#browse-search-pods-1", "div.results-wrapped"],
            )?,
        })
    }
}

pub fn sku_for(element: ElementRef<'_>, link: Option<&str>) -> Option<String> {
    own_attr(element, "data-product-id")
        .or_else(|| own_attr(element, "data-sku"))
        .or_else(|| link.and_then(sku_from_url))
}

pub fn sku_from_url(url: &str) -> Option<String> {
    SKU_IN_URL_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl MarketplaceAdapter for HomeDepotAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::HomeDepot
    }

    fn can_handle_page(&self, page: &Page, document: &Html) -> bool {
        if page.marketplace() != Some(Marketplace::HomeDepot) {
            return false;
        }
        page.url.path().starts_with("/s/") || self.landmarks.matches_document(document)
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

        let mut candidate = CandidateRecord::new(Marketplace::HomeDepot, title, Some(price.value));
        candidate.price_confidence = Some(price.confidence);
        candidate.sku = sku_for(element, fields.link.as_deref());
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

    const POD_HTML: &str = r#"
        <div class="results-wrapped">
          <div data-testid="product-pod" data-product-id="312345678">
            <a data-testid="product-header" href="/p/Acme-20V-Drill/312345678">
              <p data-testid="attribute-brandname-above">Acme</p>
              <span data-testid="attribute-product-label">20V Cordless Drill</span>
            </a>
            <div data-testid="price-simple"><div class="price-format__main-price"><span>$</span><span>99</span><span>00</span></div></div>
          </div>
          <div data-testid="product-pod">
            <a data-testid="product-header" href="/p/Acme-Bits/309876543">
              <span data-testid="attribute-product-label">Drill Bit Set</span>
            </a>
            <div data-testid="price-simple"><div class="price-format__main-price">2394</div></div>
          </div>
        </div>"#;

    #[test]
    fn test_split_and_blob_prices() {
        let adapter = HomeDepotAdapter::new().unwrap();
        let page = Page::parse("https://www.homedepot.com/s/acme%20drill", POD_HTML).unwrap();
        let document = page.document();
        assert!(adapter.can_handle_page(&page, &document));

        let elements = adapter.find_candidate_elements(&document);
        let drill = adapter.extract_candidate(elements[0], 0, &page).unwrap();
        assert_eq!(drill.price, Some(Decimal::new(9900, 2)));
        assert_eq!(drill.sku.as_deref(), Some("312345678"));
        assert_eq!(drill.brand.as_deref(), Some("Acme"));

        let bits = adapter.extract_candidate(elements[1], 1, &page).unwrap();
        assert_eq!(bits.price, Some(Decimal::new(2394, 2)));
        assert_eq!(bits.sku.as_deref(), Some("309876543"));
    }
}
