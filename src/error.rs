//! Resolution error taxonomy
//!
//! Per-candidate extraction failures never surface here; they are swallowed by
//! the extraction layer. These errors abort a single-product resolution at most.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Marketplace;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("no matcher for marketplace: {url}")]
    NoMatcherForPage { url: String },

    #[error("no search results on {marketplace} (tried {tried_selectors} selectors)")]
    NoCandidatesFound {
        marketplace: Marketplace,
        tried_selectors: usize,
    },

    #[error("no valid candidates: {located} located on {marketplace}, none had title and price")]
    NoValidCandidateData {
        marketplace: Marketplace,
        located: usize,
    },

    #[error("extraction timed out after {seconds}s: {url}")]
    ExtractionTimeout { url: String, seconds: u64 },

    #[error("page load timed out after {seconds}s: {url}")]
    LoadTimeout { url: String, seconds: u64 },

    #[error("cache read failed for '{key}': {reason}")]
    CacheReadFailure { key: String, reason: String },

    #[error("remote API failed for {marketplace}: {message}")]
    RemoteApiFailure {
        marketplace: Marketplace,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("HTTP request failed: {status} - {message} ({url})")]
    Http {
        status: u16,
        message: String,
        url: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ResolutionError {
    /// Whether the failure belongs to the product at hand rather than to the
    /// run's setup; the batch records both and moves on, but logs the latter as errors
    pub const fn is_per_product(&self) -> bool {
        !matches!(self, Self::Configuration(_) | Self::Storage(_))
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::ExtractionTimeout { .. } | Self::LoadTimeout { .. })
    }
}

pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// User-visible failure shape; never carries a backtrace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub error: String,
}

impl From<&ResolutionError> for Failure {
    fn from(err: &ResolutionError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
        }
    }
}
