//! Service layer: caching, profit and the comparison entry points

pub mod cache_service;
pub mod comparison_service;
pub mod profit_calculator;

pub use cache_service::{derive_key, CacheEntry, CacheService};
pub use comparison_service::ComparisonService;
pub use profit_calculator::ProfitCalculator;
