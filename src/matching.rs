//! Matching layer: similarity scoring, single-page match finding and the
//! category batch matcher built on top of it.

pub mod batch_matcher;
pub mod match_finder;
pub mod similarity;

pub use batch_matcher::{BatchProgress, CategoryBatchMatcher};
pub use match_finder::{MatchFinder, MatchOutcome, MatchState, MatchTiming, PageScan};
pub use similarity::{product_similarity, product_similarity_with, title_similarity, TitleSimilarityOptions};
