//! Resale Scout - cross-marketplace product resolution engine
//!
//! Finds listings on other marketplaces that represent the same physical
//! product as a source listing, ranks them by similarity and estimates the
//! profit of reselling across marketplaces.

// Module declarations
pub mod domain;
pub mod error;
pub mod extraction;
pub mod infrastructure;
pub mod matching;
pub mod services;

// Re-exports for easier access
pub use domain::{CandidateRecord, ComparisonResult, Marketplace, MatchResult, ProductRecord};
pub use error::{Failure, ResolutionError, ResolutionResult};
pub use extraction::{AdapterRegistry, MarketplaceAdapter, Page};
pub use matching::{MatchFinder, MatchOutcome};
pub use services::ComparisonService;
