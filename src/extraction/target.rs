//! Target search results adapter

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

use super::listing::{ListingSelectorSpec, ListingSelectors};
use super::page::Page;
use super::selectors::{own_attr, SelectorChain};
use super::{ExtractionError, MarketplaceAdapter};
use crate::domain::{CandidateRecord, Marketplace};

static TCIN_IN_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/A-(\d{6,10})").unwrap_or_else(|e| panic!("invalid TCIN regex: {e}")));

pub const SEARCH_SELECTORS: ListingSelectorSpec = ListingSelectorSpec {
    containers: &[
        "div[data-test='@web/site-top-of-funnel/ProductCardWrapper']",
        "[data-test='product-grid'] section > div",
        "li[data-test='list-entry-product-card']",
        "div.styles__StyledCol-sc-fw90uk-0",
    ],
    title: &[
        "a[data-test='product-title']",
        "[data-test='@web/ProductCard/title']",
        "div[data-test='product-title'] a",
        "a.styles__StyledTitleLink-sc-h3r0um-1",
    ],
    price: &[
        "span[data-test='current-price'] span",
        "[data-test='current-price']",
        "div[data-test='product-price']",
        "span.h-text-bs",
    ],
    brand: &[
        "a[data-test='@web/ProductCard/ProductCardBrandAndRibbonMessage/brand']",
        "[data-test='product-brand']",
        "div.styles__ProductCardBrandAndRibbonMessageWrapper a",
    ],
    link: &["a[data-test='product-title'][href]", "a[href*='/-/A-']", "a[href*='/p/']"],
    image: &["picture img", "img[data-test='product-image']", "img"],
    rating: &["[data-test='ratings']", "span.RatingStars__RatingStarsContainer", "div[data-ref='rating-mask']"],
    review_count: &["[data-test='rating-count']", "span[data-test='ratings-count']"],
    shipping: &["[data-test='LPFulfillmentSectionShippingFA_standardShippingMessage']", "[data-test='fulfillment-cell-shipping']"],
};

pub struct TargetAdapter {
    selectors: ListingSelectors,
    landmarks: SelectorChain,
}

impl TargetAdapter {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            selectors: ListingSelectors::compile(&SEARCH_SELECTORS)?,
            landmarks: SelectorChain::compile(
                "target_landmarks",
                &["[data-test='product-grid']", "[data-test='resultsHeading']", "div[data-test='@web/site-top-of-funnel/ProductCardWrapper']"],
            )?,
        })
    }
}

pub fn tcin_for(element: ElementRef<'_>, link: Option<&str>) -> Option<String> {
    own_attr(element, "data-tcin").or_else(|| link.and_then(tcin_from_url))
}

pub fn tcin_from_url(url: &str) -> Option<String> {
    TCIN_IN_URL_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl MarketplaceAdapter for TargetAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Target
    }

    fn can_handle_page(&self, page: &Page, document: &Html) -> bool {
        if page.marketplace() != Some(Marketplace::Target) {
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

        let mut candidate = CandidateRecord::new(Marketplace::Target, title, Some(price.value));
        candidate.price_confidence = Some(price.confidence);
        candidate.tcin = tcin_for(element, fields.link.as_deref());
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

    #[test]
    fn test_extracts_tcin_from_link() {
        let html = r#"
            <div data-test="product-grid"><section>
              <div data-test="@web/site-top-of-funnel/ProductCardWrapper">
                <a data-test="@web/ProductCard/ProductCardBrandAndRibbonMessage/brand" href="/b/acme">Acme</a>
                <a data-test="product-title" href="/p/acme-widget/-/A-54191097">Acme Widget Pro</a>
                <span data-test="current-price"><span>$14.99</span></span>
                <span data-test="ratings">4.6 out of 5 stars with 120 ratings</span>
              </div>
            </section></div>"#;
        let adapter = TargetAdapter::new().unwrap();
        let page = Page::parse("https://www.target.com/s?searchTerm=acme", html).unwrap();
        let document = page.document();
        assert!(adapter.can_handle_page(&page, &document));

        let elements = adapter.find_candidate_elements(&document);
        assert_eq!(elements.len(), 1);
        let candidate = adapter.extract_candidate(elements[0], 0, &page).unwrap();
        assert_eq!(candidate.tcin.as_deref(), Some("54191097"));
        assert_eq!(candidate.brand.as_deref(), Some("Acme"));
        assert_eq!(candidate.price, Some(Decimal::new(1499, 2)));
        assert_eq!(candidate.ratings.map(|r| r.count), Some(120));
    }

    #[test]
    fn test_rejects_other_hosts() {
        let adapter = TargetAdapter::new().unwrap();
        let page = Page::parse("https://www.homedepot.com/s/drill", "<html></html>").unwrap();
        assert!(!adapter.can_handle_page(&page, &page.document()));
    }
}
