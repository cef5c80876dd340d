//! Resolution outputs: per-candidate matches, comparison results and batch results

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::marketplace::Marketplace;
use super::product::{CandidateRecord, ProductRecord};

/// Resale profit of one candidate, rounded to cents / hundredths of a percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profit {
    pub amount: Decimal,
    pub percentage: Decimal,
}

impl Profit {
    /// Sentinel for candidates without a price of their own
    pub const ZERO: Self = Self {
        amount: Decimal::ZERO,
        percentage: Decimal::ZERO,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    /// Fee fraction expressed as percent (15 for 0.15)
    pub marketplace_fee_percent: Decimal,
    pub marketplace_fee_amount: Decimal,
    pub additional_fees: Decimal,
    pub total_fees: Decimal,
}

/// A candidate augmented with its score against the source and its resale economics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    #[serde(flatten)]
    pub candidate: CandidateRecord,
    pub similarity_score: f64,
    #[serde(default)]
    pub profit: Option<Profit>,
    #[serde(default)]
    pub fee_breakdown: Option<FeeBreakdown>,
    pub source_product_id: String,
    pub search_url: String,
}

impl MatchResult {
    pub fn new(
        candidate: CandidateRecord,
        similarity_score: f64,
        source_product_id: impl Into<String>,
        search_url: impl Into<String>,
    ) -> Self {
        Self {
            candidate,
            similarity_score,
            profit: None,
            fee_breakdown: None,
            source_product_id: source_product_id.into(),
            search_url: search_url.into(),
        }
    }
}

/// The unit cached and returned to callers for a single source product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub source_product: ProductRecord,
    /// Ranked matches per marketplace, best first
    pub matched_products: BTreeMap<Marketplace, Vec<MatchResult>>,
    /// Marketplaces whose resolution failed, with the reason
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<Marketplace, String>,
    pub timestamp: DateTime<Utc>,
}

impl ComparisonResult {
    pub fn new(source_product: ProductRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            source_product,
            matched_products: BTreeMap::new(),
            failures: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn total_matches(&self) -> usize {
        self.matched_products.values().map(Vec::len).sum()
    }

    /// Highest-profit match across every marketplace
    pub fn best_opportunity(&self) -> Option<&MatchResult> {
        self.matched_products
            .values()
            .flatten()
            .filter(|m| m.profit.is_some())
            .max_by_key(|m| m.profit.map(|p| p.amount))
    }
}

/// Outcome for one source product inside a category batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProductResult {
    pub source_product: ProductRecord,
    pub matches: Vec<MatchResult>,
    pub search_url: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Persisted outcome of a category batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPageResult {
    pub run_id: Uuid,
    pub target_marketplace: Marketplace,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub products: Vec<BatchProductResult>,
    #[serde(default)]
    pub cancelled: bool,
}

impl CategoryPageResult {
    pub fn new(target_marketplace: Marketplace, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target_marketplace,
            started_at,
            finished_at: None,
            products: Vec::new(),
            cancelled: false,
        }
    }

    pub fn matched_count(&self) -> usize {
        self.products.iter().filter(|p| !p.matches.is_empty()).count()
    }
}
