//! Field extraction shared by every marketplace listing tile
//!
//! Each adapter supplies its own selector chains; reading a tile is the same
//! per-field fallback walk everywhere.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::ElementRef;

use super::page::Page;
use super::price::{parse_price_nodes, parse_shipping_text, PriceParse};
use super::selectors::SelectorChain;
use super::ExtractionError;
use crate::domain::Ratings;

static RATING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d(?:\.\d+)?)\s*(?:out of\s*5|stars?)").unwrap_or_else(|e| panic!("invalid rating regex: {e}"))
});

static COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*([km])?").unwrap_or_else(|e| panic!("invalid count regex: {e}"))
});

static COUNT_IN_RATING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d,]*)\s*(?:reviews?|ratings?)").unwrap_or_else(|e| panic!("invalid review regex: {e}"))
});

/// Raw selector lists for one listing layout, newest first
#[derive(Debug, Clone, Copy)]
pub struct ListingSelectorSpec {
    pub containers: &'static [&'static str],
    pub title: &'static [&'static str],
    pub price: &'static [&'static str],
    pub brand: &'static [&'static str],
    pub link: &'static [&'static str],
    pub image: &'static [&'static str],
    pub rating: &'static [&'static str],
    pub review_count: &'static [&'static str],
    pub shipping: &'static [&'static str],
}

/// Compiled chains for one listing layout
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    pub containers: SelectorChain,
    title: SelectorChain,
    price: SelectorChain,
    brand: SelectorChain,
    link: SelectorChain,
    image: SelectorChain,
    rating: SelectorChain,
    review_count: SelectorChain,
    shipping: SelectorChain,
}

/// Everything readable from a tile; adapters decide which fields are mandatory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFields {
    pub title: Option<String>,
    pub price: Option<PriceParse>,
    pub brand: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub ratings: Option<Ratings>,
    pub shipping_price: Option<Decimal>,
}

impl ListingSelectors {
    pub fn compile(spec: &ListingSelectorSpec) -> Result<Self, ExtractionError> {
        Ok(Self {
            containers: SelectorChain::compile("containers", spec.containers)?,
            title: SelectorChain::compile("title", spec.title)?,
            price: SelectorChain::compile("price", spec.price)?,
            brand: SelectorChain::compile("brand", spec.brand)?,
            link: SelectorChain::compile("link", spec.link)?,
            image: SelectorChain::compile("image", spec.image)?,
            rating: SelectorChain::compile("rating", spec.rating)?,
            review_count: SelectorChain::compile("review_count", spec.review_count)?,
            shipping: SelectorChain::compile("shipping", spec.shipping)?,
        })
    }

    pub fn read(&self, element: ElementRef<'_>, page: &Page) -> ListingFields {
        let title = self.title.text_within(element);
        let price = self
            .price
            .text_nodes_within(element)
            .and_then(|nodes| parse_price_nodes(&nodes));
        let brand = self
            .brand
            .text_within(element)
            .map(|b| clean_brand(&b))
            .filter(|b| !b.is_empty());
        let link = self
            .link
            .attr_within(element, &["href"])
            .and_then(|href| page.resolve(&href));
        let image_url = self
            .image
            .attr_within(element, &["src", "data-src", "srcset"])
            .map(|src| src.split_whitespace().next().unwrap_or_default().to_string())
            .and_then(|src| page.resolve(&src));
        let ratings = self.read_ratings(element);
        let shipping_price = self
            .shipping
            .text_within(element)
            .and_then(|text| parse_shipping_text(&text));

        ListingFields {
            title,
            price,
            brand,
            link,
            image_url,
            ratings,
            shipping_price,
        }
    }

    fn read_ratings(&self, element: ElementRef<'_>) -> Option<Ratings> {
        let (rating_text, average) = [
            self.rating.text_within(element),
            self.rating.attr_within(element, &["aria-label", "data-value"]),
        ]
        .into_iter()
        .flatten()
        .find_map(|text| parse_rating(&text).map(|average| (text, average)))?;
        let count = self
            .review_count
            .text_within(element)
            .or_else(|| self.review_count.attr_within(element, &["aria-label"]))
            .and_then(|text| parse_count(&text))
            .or_else(|| parse_count_in_rating(&rating_text))
            .unwrap_or(0);
        Some(Ratings { average, count })
    }
}

/// "4.5 out of 5 stars" or a bare "4.5"
pub fn parse_rating(text: &str) -> Option<f64> {
    let value = RATING_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| text.trim(), |m| m.as_str())
        .parse::<f64>()
        .ok()?;
    (0.0..=5.0).contains(&value).then_some(value)
}

/// "1,234", "(1.2K)", "12 reviews"
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_count(text: &str) -> Option<u32> {
    let caps = COUNT_RE.captures(text)?;
    let number: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(suffix) if suffix == "k" => 1_000.0,
        Some(suffix) if suffix == "m" => 1_000_000.0,
        _ => 1.0,
    };
    let count = (number * multiplier).round();
    if count.is_finite() && count >= 0.0 && count <= f64::from(u32::MAX) {
        Some(count as u32)
    } else {
        None
    }
}

fn parse_count_in_rating(text: &str) -> Option<u32> {
    COUNT_IN_RATING_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Strip the storefront decorations around a brand line ("Visit the Acme Store", "Brand: Acme")
pub fn clean_brand(raw: &str) -> String {
    let mut brand = raw.trim();
    for prefix in ["Visit the ", "Brand: ", "by "] {
        if let Some(rest) = brand.strip_prefix(prefix) {
            brand = rest;
        }
    }
    brand.strip_suffix(" Store").unwrap_or(brand).trim().to_string()
}
