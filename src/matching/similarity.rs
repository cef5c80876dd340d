//! Similarity scoring between two product listings
//!
//! Pure functions, no I/O. Scores are normalized to `0.0..=1.0`.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::ProductLike;

static PUNCTUATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]").unwrap_or_else(|e| panic!("invalid punctuation regex: {e}")));

pub const TITLE_WEIGHT: f64 = 0.7;
pub const BRAND_WEIGHT: f64 = 0.2;
pub const PRICE_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TitleSimilarityOptions {
    /// Tokens shorter than this (in characters) are ignored
    pub min_token_length: usize,
    /// Credit for a token contained in, or containing, a token on the other side
    pub partial_weight: f64,
}

impl TitleSimilarityOptions {
    /// Brand names are short; keep every token
    pub const fn brand() -> Self {
        Self {
            min_token_length: 1,
            partial_weight: 0.5,
        }
    }
}

impl Default for TitleSimilarityOptions {
    fn default() -> Self {
        Self {
            min_token_length: 3,
            partial_weight: 0.5,
        }
    }
}

/// Lowercase with punctuation removed and whitespace collapsed
pub fn normalize_title(text: &str) -> String {
    PUNCTUATION_RE
        .replace_all(&text.to_lowercase(), "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(normalized: &str, min_len: usize) -> BTreeSet<&str> {
    normalized
        .split(' ')
        .filter(|t| t.chars().count() >= min_len.max(1))
        .collect()
}

/// Token overlap score.
///
/// An exact shared token counts 1, a token containing (or contained in) one on
/// the other side counts `partial_weight`. Partial pairs are counted from both
/// sides and the smaller count is used so the score is symmetric.
pub fn title_similarity(a: &str, b: &str, options: &TitleSimilarityOptions) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);
    if !a.is_empty() && a == b {
        return 1.0;
    }

    let left = tokens(&a, options.min_token_length);
    let right = tokens(&b, options.min_token_length);
    let denominator = left.len().max(right.len());
    if denominator == 0 {
        return 0.0;
    }

    let exact = left.intersection(&right).count();
    let partial = partial_containment(&left, &right).min(partial_containment(&right, &left));

    let score = options.partial_weight.mul_add(partial as f64, exact as f64) / denominator as f64;
    score.min(1.0)
}

fn partial_containment(from: &BTreeSet<&str>, other: &BTreeSet<&str>) -> usize {
    from.iter()
        .filter(|token| !other.contains(*token))
        .filter(|token| {
            other
                .iter()
                .any(|candidate| candidate.contains(**token) || token.contains(*candidate))
        })
        .count()
}

/// Price proximity `1 - |a - b| / max(a, b)`, floored at zero
pub fn price_proximity(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max <= 0.0 {
        return if (a - b).abs() < f64::EPSILON { 1.0 } else { 0.0 };
    }
    (1.0 - (a - b).abs() / max).max(0.0)
}

/// Weighted title / brand / price blend using default title options
pub fn product_similarity<S, T>(source: &S, target: &T) -> f64
where
    S: ProductLike + ?Sized,
    T: ProductLike + ?Sized,
{
    product_similarity_with(source, target, &TitleSimilarityOptions::default())
}

/// Weighted blend; brand and price only participate when both sides carry
/// them, and absent weights drop out of the denominator.
pub fn product_similarity_with<S, T>(source: &S, target: &T, options: &TitleSimilarityOptions) -> f64
where
    S: ProductLike + ?Sized,
    T: ProductLike + ?Sized,
{
    let mut weighted = TITLE_WEIGHT * title_similarity(source.title(), target.title(), options);
    let mut total_weight = TITLE_WEIGHT;

    let brands = source
        .brand()
        .filter(|b| !b.trim().is_empty())
        .zip(target.brand().filter(|b| !b.trim().is_empty()));
    if let Some((a, b)) = brands {
        weighted += BRAND_WEIGHT * title_similarity(a, b, &TitleSimilarityOptions::brand());
        total_weight += BRAND_WEIGHT;
    }

    let prices = source
        .price()
        .and_then(|p| p.to_f64())
        .zip(target.price().and_then(|p| p.to_f64()));
    if let Some((a, b)) = prices {
        weighted += PRICE_WEIGHT * price_proximity(a, b);
        total_weight += PRICE_WEIGHT;
    }

    (weighted / total_weight).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateRecord, Marketplace, ProductRecord};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn opts() -> TitleSimilarityOptions {
        TitleSimilarityOptions::default()
    }

    #[test]
    fn test_identical_after_normalization() {
        assert!((title_similarity("Acme Widget!", "acme  widget", &opts()) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exact_overlap_over_larger_side() {
        let score = title_similarity("Acme Widget", "Acme Widget Pro", &opts());
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_containment_counts_half() {
        // "widgets" contains "widget"
        let score = title_similarity("Acme Widget", "Acme Widgets", &opts());
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_short_tokens_dropped() {
        // "a" and "of" are below the default minimum
        let score = title_similarity("Box of a Nails", "Box Nails", &opts());
        assert!((score - 1.0).abs() < 1e-9);
        assert!(title_similarity("a b", "c d", &opts()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_brand_options_keep_short_tokens() {
        assert!((title_similarity("3M", "3M", &TitleSimilarityOptions::brand()) - 1.0).abs() < f64::EPSILON);
        assert!((title_similarity("LG", "lg", &TitleSimilarityOptions::brand()) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_product_similarity_excludes_absent_attributes() {
        let source = ProductRecord::new(Marketplace::Amazon, "B0", "Acme Widget");
        let target = CandidateRecord::new(Marketplace::Walmart, "Acme Widget", None);
        assert!((product_similarity(&source, &target) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_product_similarity_blend() {
        let source = ProductRecord::new(Marketplace::Amazon, "B0", "Acme Widget")
            .with_brand("Acme")
            .with_price(Decimal::new(1000, 2));
        let mut target = CandidateRecord::new(Marketplace::Walmart, "Acme Widget Pro", Some(Decimal::new(1500, 2)));
        target.brand = Some("Acme".into());

        let expected = 0.1f64.mul_add(1.0 - 5.0 / 15.0, 0.7f64.mul_add(2.0 / 3.0, 0.2));
        assert!((product_similarity(&source, &target) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_price_proximity_floor() {
        assert!((price_proximity(10.0, 10.0) - 1.0).abs() < f64::EPSILON);
        assert!((price_proximity(10.0, 20.0) - 0.5).abs() < f64::EPSILON);
        assert!(price_proximity(0.0, 20.0).abs() < f64::EPSILON);
    }

    fn title_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z0-9]{1,10}( [A-Za-z0-9,.-]{1,10}){0,6}"
    }

    proptest! {
        #[test]
        fn prop_title_similarity_reflexive(title in title_strategy()) {
            prop_assume!(!normalize_title(&title).is_empty());
            prop_assert!((title_similarity(&title, &title, &opts()) - 1.0).abs() < f64::EPSILON);
        }

        #[test]
        fn prop_title_similarity_bounded(a in title_strategy(), b in title_strategy()) {
            let score = title_similarity(&a, &b, &opts());
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_product_similarity_symmetric(
            a in title_strategy(),
            b in title_strategy(),
            brand_a in "[A-Za-z]{1,8}",
            brand_b in "[A-Za-z]{1,8}",
        ) {
            let left = ProductRecord::new(Marketplace::Amazon, "1", a.clone()).with_brand(brand_a.clone());
            let right = ProductRecord::new(Marketplace::Walmart, "2", b.clone()).with_brand(brand_b.clone());
            let forward = product_similarity(&left, &right);
            let backward = product_similarity(&right, &left);
            prop_assert!((forward - backward).abs() < 1e-12);
        }
    }
}
