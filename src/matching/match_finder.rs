//! Single-product match finder
//!
//! Drives one adapter over a loaded results page through a fixed sequence of
//! states:
//!
//! `Init → DetermineMarketplace → LocateCandidates → Extract → Score → Rank →
//! Threshold → Done`, with `Error` reachable from every step.
//!
//! Each state's wall clock time is recorded in the outcome. The finder is
//! synchronous: the DOM it walks is not `Send`, so async callers run it on a
//! blocking thread.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::domain::{CandidateRecord, Marketplace, MatchResult, ProductRecord};
use crate::error::{ResolutionError, ResolutionResult};
use crate::extraction::{AdapterRegistry, MarketplaceAdapter, Page};
use crate::infrastructure::config::MatchingConfig;
use crate::matching::similarity::product_similarity_with;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Init,
    DetermineMarketplace,
    LocateCandidates,
    Extract,
    Score,
    Rank,
    Threshold,
    Done,
    Error,
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::DetermineMarketplace => "determine_marketplace",
            Self::LocateCandidates => "locate_candidates",
            Self::Extract => "extract",
            Self::Score => "score",
            Self::Rank => "rank",
            Self::Threshold => "threshold",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTiming {
    pub state: MatchState,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchTiming {
    pub states: Vec<StateTiming>,
    pub total: Duration,
}

impl MatchTiming {
    pub fn elapsed_in(&self, state: MatchState) -> Option<Duration> {
        self.states.iter().find(|t| t.state == state).map(|t| t.elapsed)
    }

    /// States visited, in order
    pub fn path(&self) -> Vec<MatchState> {
        self.states.iter().map(|t| t.state).collect()
    }
}

/// Records transitions and how long each state lasted
struct StateTracker {
    current: MatchState,
    entered_at: Instant,
    started_at: Instant,
    timing: MatchTiming,
}

impl StateTracker {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            current: MatchState::Init,
            entered_at: now,
            started_at: now,
            timing: MatchTiming::default(),
        }
    }

    fn enter(&mut self, next: MatchState) {
        let now = Instant::now();
        self.timing.states.push(StateTiming {
            state: self.current,
            elapsed: now.duration_since(self.entered_at),
        });
        trace!("Match finder: {} -> {}", self.current, next);
        self.current = next;
        self.entered_at = now;
    }

    fn finish(mut self) -> MatchTiming {
        let now = Instant::now();
        self.timing.states.push(StateTiming {
            state: self.current,
            elapsed: now.duration_since(self.entered_at),
        });
        self.timing.total = now.duration_since(self.started_at);
        self.timing
    }
}

fn serialize_error<S: Serializer>(error: &Option<ResolutionError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Result of resolving one source product against one results page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub success: bool,
    pub best_match: Option<MatchResult>,
    /// Ranked best first, capped at `max_results`
    pub all_matches: Vec<MatchResult>,
    pub search_url: String,
    pub source_product: ProductRecord,
    pub marketplace: Option<Marketplace>,
    pub timing: MatchTiming,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ResolutionError>,
}

/// Candidates found on a page without scoring, for diagnostics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageScan {
    pub marketplace: Marketplace,
    pub located: usize,
    pub candidates: Vec<CandidateRecord>,
}

#[derive(Clone)]
pub struct MatchFinder {
    registry: Arc<AdapterRegistry>,
    config: MatchingConfig,
}

impl MatchFinder {
    pub const fn new(registry: Arc<AdapterRegistry>, config: MatchingConfig) -> Self {
        Self { registry, config }
    }

    pub const fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Resolve `source` against the results on `page`, picking the adapter from the page
    pub fn find_matches(&self, source: &ProductRecord, page: &Page) -> MatchOutcome {
        self.run(source, page, None)
    }

    /// Same as [`find_matches`](Self::find_matches) with the adapter chosen by the caller
    pub fn find_matches_with(&self, source: &ProductRecord, page: &Page, marketplace: Marketplace) -> MatchOutcome {
        self.run(source, page, Some(marketplace))
    }

    fn run(&self, source: &ProductRecord, page: &Page, forced: Option<Marketplace>) -> MatchOutcome {
        let mut tracker = StateTracker::new();
        let search_url = page.url.to_string();
        let mut outcome = MatchOutcome {
            success: false,
            best_match: None,
            all_matches: Vec::new(),
            search_url: search_url.clone(),
            source_product: source.clone(),
            marketplace: None,
            timing: MatchTiming::default(),
            error: None,
        };

        match self.resolve(source, page, forced, &mut tracker, &mut outcome) {
            Ok(()) => tracker.enter(MatchState::Done),
            Err(e) => {
                warn!("Match finder failed for '{}' on {}: {}", source.title, search_url, e);
                tracker.enter(MatchState::Error);
                outcome.error = Some(e);
            }
        }

        outcome.timing = tracker.finish();
        outcome
    }

    fn resolve(
        &self,
        source: &ProductRecord,
        page: &Page,
        forced: Option<Marketplace>,
        tracker: &mut StateTracker,
        outcome: &mut MatchOutcome,
    ) -> ResolutionResult<()> {
        tracker.enter(MatchState::DetermineMarketplace);
        let document = page.document();
        let adapter = self.select_adapter(page, &document, forced)?;
        let marketplace = adapter.marketplace();
        outcome.marketplace = Some(marketplace);

        tracker.enter(MatchState::LocateCandidates);
        let elements = adapter.find_candidate_elements(&document);
        if elements.is_empty() {
            return Err(ResolutionError::NoCandidatesFound {
                marketplace,
                tried_selectors: adapter.container_selector_count(),
            });
        }

        tracker.enter(MatchState::Extract);
        let located = elements.len();
        let candidates: Vec<CandidateRecord> = elements
            .into_iter()
            .enumerate()
            .filter_map(|(position, element)| adapter.extract_candidate(element, position, page))
            .collect();
        if candidates.is_empty() {
            return Err(ResolutionError::NoValidCandidateData { marketplace, located });
        }
        debug!("{} of {} located candidates extracted on {}", candidates.len(), located, marketplace);

        tracker.enter(MatchState::Score);
        let mut scored = self.score_all(adapter, source, candidates, &outcome.search_url);

        tracker.enter(MatchState::Rank);
        sort_ranked(&mut scored);

        tracker.enter(MatchState::Threshold);
        let top_score = scored.first().map_or(0.0, |m| m.similarity_score);
        outcome.success = top_score >= self.config.min_similarity;
        if outcome.success {
            outcome.best_match = scored.first().cloned();
        }
        scored.truncate(self.config.max_results);
        outcome.all_matches = scored;

        info!(
            "Match finder on {}: top score {:.3} (threshold {:.2}), {} returned",
            marketplace,
            top_score,
            self.config.min_similarity,
            outcome.all_matches.len()
        );
        Ok(())
    }

    fn select_adapter<'r>(
        &'r self,
        page: &Page,
        document: &scraper::Html,
        forced: Option<Marketplace>,
    ) -> ResolutionResult<&'r dyn MarketplaceAdapter> {
        let adapter = match forced {
            Some(marketplace) => self.registry.get(marketplace),
            None => self.registry.resolve_for_page(page, document),
        };
        adapter.ok_or_else(|| ResolutionError::NoMatcherForPage {
            url: page.url.to_string(),
        })
    }

    /// `max(title similarity, blended product similarity)`; a shared UPC or
    /// ASIN is the same product whatever the titles say
    pub fn score(&self, adapter: &dyn MarketplaceAdapter, source: &ProductRecord, candidate: &CandidateRecord) -> f64 {
        if same_identifier(source.upc.as_deref(), candidate.upc.as_deref())
            || same_identifier(source.asin.as_deref(), candidate.asin.as_deref())
        {
            return 1.0;
        }
        let options = &self.config.title_options;
        let title = adapter.compute_similarity_of_titles(&source.title, &candidate.title, options);
        let product = product_similarity_with(source, candidate, options);
        title.max(product)
    }

    fn score_all(
        &self,
        adapter: &dyn MarketplaceAdapter,
        source: &ProductRecord,
        candidates: Vec<CandidateRecord>,
        search_url: &str,
    ) -> Vec<MatchResult> {
        candidates
            .into_iter()
            .map(|candidate| {
                let score = self.score(adapter, source, &candidate);
                debug!("  #{} {:.3} '{}'", candidate.position, score, candidate.title);
                MatchResult::new(candidate, score, source.product_id.clone(), search_url)
            })
            .collect()
    }

    /// Score, rank and cap candidates obtained without a page (remote API
    /// lookups). `None` when no adapter is registered for `marketplace`.
    pub fn rank_candidates(
        &self,
        source: &ProductRecord,
        marketplace: Marketplace,
        candidates: Vec<CandidateRecord>,
        search_url: &str,
    ) -> Option<Vec<MatchResult>> {
        let adapter = self.registry.get(marketplace)?;
        let mut ranked = self.score_all(adapter, source, candidates, search_url);
        sort_ranked(&mut ranked);
        ranked.truncate(self.config.max_results);
        Some(ranked)
    }

    /// Locate and extract only
    pub fn scan_page(&self, page: &Page) -> ResolutionResult<PageScan> {
        let document = page.document();
        let adapter = self.select_adapter(page, &document, None)?;
        let marketplace = adapter.marketplace();

        let elements = adapter.find_candidate_elements(&document);
        let located = elements.len();
        let candidates = elements
            .into_iter()
            .enumerate()
            .filter_map(|(position, element)| adapter.extract_candidate(element, position, page))
            .collect();

        Ok(PageScan {
            marketplace,
            located,
            candidates,
        })
    }
}

/// Descending by score; `sort_by` is stable so ties keep discovery order
fn sort_ranked(matches: &mut [MatchResult]) {
    matches.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
}

fn same_identifier(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.map(str::trim), b.map(str::trim)) {
        (Some(a), Some(b)) => !a.is_empty() && a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn finder() -> MatchFinder {
        MatchFinder::new(
            Arc::new(AdapterRegistry::with_defaults().unwrap()),
            MatchingConfig::default(),
        )
    }

    fn source() -> ProductRecord {
        ProductRecord::new(Marketplace::Amazon, "B0ACME", "Acme Widget Blue")
            .with_brand("Acme")
            .with_price(Decimal::new(1000, 2))
    }

    const WALMART_RESULTS: &str = r#"
        <html><body>
          <div data-item-id="111">
            <span data-automation-id="product-title">Garden Hose 50ft</span>
            <div data-automation-id="product-price"><span class="w_iUH7">$19.99</span></div>
          </div>
          <div data-item-id="222">
            <span data-automation-id="product-title">Acme Widget Blue</span>
            <div data-automation-id="product-price"><span class="w_iUH7">$15.00</span></div>
          </div>
          <div data-item-id="333">
            <span data-automation-id="product-title">No price here</span>
          </div>
        </body></html>"#;

    #[test]
    fn test_no_elements_reports_no_search_results() {
        let page = Page::parse("https://www.walmart.com/search?q=acme", "<html><body></body></html>").unwrap();
        let outcome = finder().find_matches(&source(), &page);

        assert!(!outcome.success);
        assert!(outcome.all_matches.is_empty());
        let message = outcome.error.as_ref().unwrap().to_string();
        assert!(message.contains("no search results"));
        assert_eq!(outcome.timing.path().last(), Some(&MatchState::Error));
    }

    #[test]
    fn test_unknown_page_has_no_matcher() {
        let page = Page::parse("https://shop.example.com/?q=acme", WALMART_RESULTS).unwrap();
        let outcome = finder().find_matches(&source(), &page);
        assert!(matches!(outcome.error, Some(ResolutionError::NoMatcherForPage { .. })));
        assert!(outcome.marketplace.is_none());
    }

    #[test]
    fn test_ranks_best_candidate_first() {
        let page = Page::parse("https://www.walmart.com/search?q=acme+widget", WALMART_RESULTS).unwrap();
        let outcome = finder().find_matches(&source(), &page);

        assert!(outcome.success, "error: {:?}", outcome.error);
        let best = outcome.best_match.as_ref().unwrap();
        assert_eq!(best.candidate.item_id.as_deref(), Some("222"));
        assert!(best.similarity_score >= 0.9);
        assert_eq!(best.source_product_id, "B0ACME");
        // the tile without a price is dropped
        assert_eq!(outcome.all_matches.len(), 2);
        assert_eq!(outcome.timing.path().last(), Some(&MatchState::Done));
        assert!(outcome.timing.elapsed_in(MatchState::Score).is_some());
    }

    #[test]
    fn test_below_threshold_still_returns_candidates() {
        let page = Page::parse("https://www.walmart.com/search?q=hose", WALMART_RESULTS).unwrap();
        let source = ProductRecord::new(Marketplace::Amazon, "B0X", "Cordless Drill Kit");
        let outcome = finder().find_matches(&source, &page);

        assert!(!outcome.success);
        assert!(outcome.best_match.is_none());
        assert!(outcome.error.is_none());
        assert_eq!(outcome.all_matches.len(), 2);
    }

    #[test]
    fn test_max_results_caps_output() {
        let page = Page::parse("https://www.walmart.com/search?q=acme", WALMART_RESULTS).unwrap();
        let finder = MatchFinder::new(
            Arc::new(AdapterRegistry::with_defaults().unwrap()),
            MatchingConfig {
                max_results: 1,
                ..MatchingConfig::default()
            },
        );
        let outcome = finder.find_matches(&source(), &page);
        assert_eq!(outcome.all_matches.len(), 1);
    }

    #[test]
    fn test_rank_candidates_is_stable_and_trusts_upc() {
        let mut first = CandidateRecord::new(Marketplace::Target, "Acme Widget", Some(Decimal::new(1500, 2)));
        first.position = 0;
        let mut second = first.clone();
        second.position = 1;
        let mut by_upc = CandidateRecord::new(Marketplace::Target, "Totally different", None);
        by_upc.upc = Some("012345678905".into());
        by_upc.position = 2;

        let source = source().with_upc("012345678905");
        let ranked = finder()
            .rank_candidates(&source, Marketplace::Target, vec![first, second, by_upc], "https://www.target.com/s")
            .unwrap();

        assert_eq!(ranked[0].candidate.position, 2);
        assert!((ranked[0].similarity_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(ranked[1].candidate.position, 0);
        assert_eq!(ranked[2].candidate.position, 1);
    }

    #[test]
    fn test_forced_adapter_and_scan() {
        let page = Page::parse("https://mirror.example.com/search?q=acme", WALMART_RESULTS).unwrap();
        let outcome = finder().find_matches_with(&source(), &page, Marketplace::Walmart);
        assert!(outcome.success);

        let page = Page::parse("https://www.walmart.com/search?q=acme", WALMART_RESULTS).unwrap();
        let scan = finder().scan_page(&page).unwrap();
        assert_eq!(scan.marketplace, Marketplace::Walmart);
        assert_eq!(scan.located, 3);
        assert_eq!(scan.candidates.len(), 2);
    }
}
