//! Category / browse page adapters
//!
//! These read the *source* side: listing tiles on a category page become
//! [`ProductRecord`]s that the batch matcher then resolves elsewhere. Browse
//! pages reuse the search tile markup, so field chains are shared with the
//! search adapters and only containers and pagination differ.

use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use super::listing::{ListingSelectorSpec, ListingSelectors};
use super::page::Page;
use super::selectors::SelectorChain;
use super::{amazon, walmart, ExtractionError};
use crate::domain::{Marketplace, ProductRecord};

pub trait CategoryPageAdapter: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    fn can_handle_page(&self, page: &Page, document: &Html) -> bool;

    fn find_product_elements<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>>;

    /// Title and identifier are required; price is optional on the source side
    fn extract_source_product(&self, element: ElementRef<'_>, page: &Page) -> Option<ProductRecord>;

    /// Continuation to load before the page is complete (next page of an
    /// infinite scroll or paginated grid). `None` when nothing more is available.
    fn prepare_page(&self, _page: &Page, _document: &Html) -> Option<Url> {
        None
    }

    /// Every extractable product on one loaded page, in page order
    fn extract_products(&self, page: &Page) -> Vec<ProductRecord> {
        let document = page.document();
        let products: Vec<ProductRecord> = self
            .find_product_elements(&document)
            .into_iter()
            .filter_map(|element| self.extract_source_product(element, page))
            .collect();
        debug!("{} category page yielded {} products", self.marketplace(), products.len());
        products
    }
}

const AMAZON_CATEGORY_SELECTORS: ListingSelectorSpec = ListingSelectorSpec {
    containers: &[
        "div[data-component-type='s-search-result'][data-asin]",
        "div#gridItemRoot",
        "div.p13n-sc-uncoverable-faceout",
        "li.octopus-pc-item",
    ],
    title: &[
        "h2 a span",
        "h2 span",
        "div._cDEzb_p13n-sc-css-line-clamp-3_g3dy1",
        "div.p13n-sc-truncate-desktop-type2",
        "a.a-link-normal span div",
        "span.octopus-pc-asin-title",
    ],
    price: &[
        ".a-price:not(.a-text-price) .a-offscreen",
        "span._cDEzb_p13n-sc-price_3mJ9Z",
        "span.p13n-sc-price",
        "span.a-price",
    ],
    link: &[
        "h2 a[href]",
        "a.a-link-normal[href*='/dp/']",
        "a[href*='/dp/']",
    ],
    ..amazon::SEARCH_SELECTORS
};

const WALMART_CATEGORY_SELECTORS: ListingSelectorSpec = ListingSelectorSpec {
    containers: &[
        "div[data-item-id]",
        "[data-testid='list-view'] > div",
        "div[data-testid='item-stack'] > div",
        "li.search-result-gridview-item",
    ],
    ..walmart::SEARCH_SELECTORS
};

pub struct AmazonCategoryAdapter {
    selectors: ListingSelectors,
    landmarks: SelectorChain,
    next_page: SelectorChain,
}

impl AmazonCategoryAdapter {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            selectors: ListingSelectors::compile(&AMAZON_CATEGORY_SELECTORS)?,
            landmarks: SelectorChain::compile(
                "amazon_category_landmarks",
                &["#zg-right-col", "div.p13n-desktop-grid", "#departments", "div.octopus-page-style"],
            )?,
            next_page: SelectorChain::compile(
                "amazon_next_page",
                &["a.s-pagination-next:not(.s-pagination-disabled)", "li.a-last a", "link[rel='next']"],
            )?,
        })
    }
}

impl CategoryPageAdapter for AmazonCategoryAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Amazon
    }

    fn can_handle_page(&self, page: &Page, document: &Html) -> bool {
        if page.marketplace() != Some(Marketplace::Amazon) {
            return false;
        }
        let path = page.url.path();
        let browse_query = page.query_param("node").is_some() || page.query_param("rh").is_some();
        path.starts_with("/b")
            || path.contains("/zgbs/")
            || path.contains("/gp/bestsellers")
            || (path.starts_with("/s") && browse_query)
            || self.landmarks.matches_document(document)
    }

    fn find_product_elements<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        self.selectors
            .containers
            .select_first_non_empty(document)
            .unwrap_or_default()
    }

    fn extract_source_product(&self, element: ElementRef<'_>, page: &Page) -> Option<ProductRecord> {
        let fields = self.selectors.read(element, page);
        let title = fields.title?;
        let asin = amazon::asin_for(element, fields.link.as_deref())?;

        let mut product = ProductRecord::new(Marketplace::Amazon, asin.clone(), title).with_asin(asin);
        product.price = fields.price.map(|p| p.value);
        product.price_confidence = fields.price.map(|p| p.confidence);
        product.brand = fields.brand;
        product.image_url = fields.image_url;
        product.page_url = fields.link.unwrap_or_default();
        Some(product)
    }

    fn prepare_page(&self, page: &Page, document: &Html) -> Option<Url> {
        next_page_url(&self.next_page, page, document)
    }
}

pub struct WalmartCategoryAdapter {
    selectors: ListingSelectors,
    next_page: SelectorChain,
}

impl WalmartCategoryAdapter {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            selectors: ListingSelectors::compile(&WALMART_CATEGORY_SELECTORS)?,
            next_page: SelectorChain::compile(
                "walmart_next_page",
                &["a[data-testid='NextPage']", "a[aria-label='Next Page']", "link[rel='next']"],
            )?,
        })
    }
}

impl CategoryPageAdapter for WalmartCategoryAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Walmart
    }

    fn can_handle_page(&self, page: &Page, _document: &Html) -> bool {
        if page.marketplace() != Some(Marketplace::Walmart) {
            return false;
        }
        let path = page.url.path();
        path.starts_with("/browse/") || path.starts_with("/cp/") || path.starts_with("/shop/")
    }

    fn find_product_elements<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        self.selectors
            .containers
            .select_first_non_empty(document)
            .unwrap_or_default()
    }

    fn extract_source_product(&self, element: ElementRef<'_>, page: &Page) -> Option<ProductRecord> {
        let fields = self.selectors.read(element, page);
        let title = fields.title?;
        let item_id = walmart::item_id_for(element, fields.link.as_deref())?;

        let mut product = ProductRecord::new(Marketplace::Walmart, item_id, title);
        product.price = fields.price.map(|p| p.value);
        product.price_confidence = fields.price.map(|p| p.confidence);
        product.brand = fields.brand;
        product.image_url = fields.image_url;
        product.page_url = fields.link.unwrap_or_default();
        Some(product)
    }

    fn prepare_page(&self, page: &Page, document: &Html) -> Option<Url> {
        next_page_url(&self.next_page, page, document)
    }
}

fn next_page_url(chain: &SelectorChain, page: &Page, document: &Html) -> Option<Url> {
    let element = chain.select_first_non_empty(document)?.into_iter().next()?;
    let href = element.value().attr("href")?;
    let next = page.resolve(href).and_then(|raw| Url::parse(&raw).ok())?;
    (next != page.url).then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const AMAZON_BROWSE_HTML: &str = r#"
        <html><body><div class="s-main-slot">
          <div data-component-type="s-search-result" data-asin="B0SRC00001">
            <h2><a href="/dp/B0SRC00001"><span>Acme Widget</span></a></h2>
            <span class="a-price"><span class="a-offscreen">$10.00</span></span>
          </div>
          <div data-component-type="s-search-result" data-asin="">
            <h2><a href="/dp/B0SRC00002"><span>Acme Sprocket</span></a></h2>
          </div>
          <div data-component-type="s-search-result" data-asin="">
            <h2><span>Sponsored thing without a link</span></h2>
          </div>
        </div>
        <a class="s-pagination-next" href="/s?rh=n%3A1234&page=2">Next</a>
        </body></html>"#;

    #[test]
    fn test_amazon_category_extracts_sources_with_optional_price() {
        let adapter = AmazonCategoryAdapter::new().unwrap();
        let page = Page::parse("https://www.amazon.com/s?rh=n%3A1234", AMAZON_BROWSE_HTML).unwrap();
        assert!(adapter.can_handle_page(&page, &page.document()));

        let products = adapter.extract_products(&page);
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].product_id, "B0SRC00001");
        assert_eq!(products[0].price, Some(Decimal::new(1000, 2)));
        assert_eq!(products[1].asin.as_deref(), Some("B0SRC00002"));
        assert_eq!(products[1].price, None);
    }

    #[test]
    fn test_amazon_category_next_page() {
        let adapter = AmazonCategoryAdapter::new().unwrap();
        let page = Page::parse("https://www.amazon.com/s?rh=n%3A1234", AMAZON_BROWSE_HTML).unwrap();
        let next = adapter.prepare_page(&page, &page.document()).unwrap();
        assert_eq!(next.query_pairs().find(|(k, _)| k == "page").map(|(_, v)| v.into_owned()).as_deref(), Some("2"));

        let last = Page::parse("https://www.amazon.com/s?rh=n%3A1234", "<div class='s-main-slot'></div>").unwrap();
        assert!(adapter.prepare_page(&last, &last.document()).is_none());
    }

    #[test]
    fn test_walmart_category_requires_browse_path() {
        let adapter = WalmartCategoryAdapter::new().unwrap();
        let browse = Page::parse("https://www.walmart.com/browse/electronics/3944", "").unwrap();
        let search = Page::parse("https://www.walmart.com/search?q=tv", "").unwrap();
        assert!(adapter.can_handle_page(&browse, &browse.document()));
        assert!(!adapter.can_handle_page(&search, &search.document()));
    }
}
