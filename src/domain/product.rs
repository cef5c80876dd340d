use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::marketplace::Marketplace;

/// How a listed price was read off the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceConfidence {
    /// Decimal point present on the page, or whole/fraction nodes identified
    Exact,
    /// Decimal point inserted by guess from a bare digit blob
    Heuristic,
}

/// Read access shared by source products and extracted candidates,
/// used by the similarity scorer
pub trait ProductLike {
    fn title(&self) -> &str;
    fn brand(&self) -> Option<&str>;
    fn price(&self) -> Option<Decimal>;
}

/// A product as seen on its origin marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub title: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Set when the price was scraped; `None` for prices from input files or APIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_confidence: Option<PriceConfidence>,
    pub marketplace: Marketplace,
    /// Marketplace-local identifier (ASIN, item id, TCIN, SKU ...)
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub asin: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub page_url: String,
}

impl ProductRecord {
    pub fn new(marketplace: Marketplace, product_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            price: None,
            price_confidence: None,
            marketplace,
            product_id: product_id.into(),
            brand: None,
            upc: None,
            asin: None,
            image_url: None,
            page_url: String::new(),
        }
    }

    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    #[must_use]
    pub fn with_upc(mut self, upc: impl Into<String>) -> Self {
        self.upc = Some(upc.into());
        self
    }

    #[must_use]
    pub fn with_asin(mut self, asin: impl Into<String>) -> Self {
        self.asin = Some(asin.into());
        self
    }

    #[must_use]
    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = url.into();
        self
    }

    /// Free-text query used to search other marketplaces: brand followed by title,
    /// skipping the brand when the title already leads with it
    pub fn search_query(&self) -> String {
        let title = self.title.trim();
        match self.brand.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(brand) if !title.to_lowercase().starts_with(&brand.to_lowercase()) => {
                format!("{brand} {title}")
            }
            _ => title.to_string(),
        }
    }
}

impl ProductLike for ProductRecord {
    fn title(&self) -> &str {
        &self.title
    }

    fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }

    fn price(&self) -> Option<Decimal> {
        self.price
    }
}

/// Average star rating and review count of a listing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratings {
    pub average: f64,
    pub count: u32,
}

/// A listing extracted from a result page on a marketplace other than the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub title: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Set when the price was scraped; a `Heuristic` price may be off by a factor of 100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_confidence: Option<PriceConfidence>,
    #[serde(default)]
    pub shipping_price: Option<Decimal>,
    pub marketplace: Marketplace,
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub asin: Option<String>,
    /// Walmart item id
    #[serde(default)]
    pub item_id: Option<String>,
    /// Target catalog number
    #[serde(default)]
    pub tcin: Option<String>,
    /// Home Depot store SKU / internet number
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub page_url: String,
    #[serde(default)]
    pub ratings: Option<Ratings>,
    /// Discovery order on the result page
    #[serde(default)]
    pub position: usize,
}

impl CandidateRecord {
    pub fn new(marketplace: Marketplace, title: impl Into<String>, price: Option<Decimal>) -> Self {
        Self {
            title: title.into(),
            price,
            price_confidence: None,
            shipping_price: None,
            marketplace,
            product_id: String::new(),
            brand: None,
            upc: None,
            asin: None,
            item_id: None,
            tcin: None,
            sku: None,
            image_url: None,
            page_url: String::new(),
            ratings: None,
            position: 0,
        }
    }

    /// Fill `product_id` from the first marketplace-specific identifier present
    pub fn resolve_product_id(&mut self) {
        if !self.product_id.is_empty() {
            return;
        }
        let id = match self.marketplace {
            Marketplace::Amazon => self.asin.clone(),
            Marketplace::Walmart => self.item_id.clone(),
            Marketplace::Target => self.tcin.clone(),
            Marketplace::HomeDepot => self.sku.clone(),
        };
        if let Some(id) = id.or_else(|| self.upc.clone()) {
            self.product_id = id;
        }
    }
}

impl ProductLike for CandidateRecord {
    fn title(&self) -> &str {
        &self.title
    }

    fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }

    fn price(&self) -> Option<Decimal> {
        self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_prefixes_brand_once() {
        let product = ProductRecord::new(Marketplace::Amazon, "B01", "Widget Pro").with_brand("Acme");
        assert_eq!(product.search_query(), "Acme Widget Pro");

        let product = ProductRecord::new(Marketplace::Amazon, "B01", "Acme Widget").with_brand("acme");
        assert_eq!(product.search_query(), "Acme Widget");

        let product = ProductRecord::new(Marketplace::Amazon, "B01", "  Widget ");
        assert_eq!(product.search_query(), "Widget");
    }

    #[test]
    fn test_resolve_product_id_prefers_marketplace_identifier() {
        let mut candidate = CandidateRecord::new(Marketplace::Target, "Widget", None);
        candidate.upc = Some("012345678905".into());
        candidate.tcin = Some("54191097".into());
        candidate.resolve_product_id();
        assert_eq!(candidate.product_id, "54191097");

        let mut candidate = CandidateRecord::new(Marketplace::Walmart, "Widget", None);
        candidate.upc = Some("012345678905".into());
        candidate.resolve_product_id();
        assert_eq!(candidate.product_id, "012345678905");
    }

    #[test]
    fn test_product_record_deserializes_camel_case() {
        let json = r#"{"title":"Acme Widget","price":10.0,"marketplace":"amazon","productId":"B0X","brand":"Acme"}"#;
        let product: ProductRecord = serde_json::from_str(json).unwrap();
        assert_eq!(product.product_id, "B0X");
        assert_eq!(product.price, Some(Decimal::new(10, 0)));
        assert!(product.upc.is_none());
    }
}
