//! Domain module - products, candidates, match results and fee schedules
//!
//! Plain data types shared by the extraction, matching and service layers.

pub mod comparison;
pub mod fees;
pub mod marketplace;
pub mod product;

pub use comparison::{
    BatchProductResult, CategoryPageResult, ComparisonResult, FeeBreakdown, MatchResult, Profit,
};
pub use fees::FeeSchedule;
pub use marketplace::Marketplace;
pub use product::{CandidateRecord, PriceConfidence, ProductLike, ProductRecord, Ratings};
