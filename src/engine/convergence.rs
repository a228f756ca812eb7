use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::extract::{self, ParseFailure};
use super::{dedup, filter, HarvestError, ParsedReview, RawBlock};

/// Consecutive passes with zero newly accepted records before the page is
/// considered out of discoverable content.
const NO_NEW_STREAK_LIMIT: usize = 2;

/// What the rendering collaborator must provide: a snapshot of currently
/// visible text blocks, and a best-effort action that reveals more content.
/// `reveal_more` may be a no-op near the end of content.
pub trait ReviewSource {
    fn visible_blocks(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Vec<RawBlock>, HarvestError>> + Send;
    fn reveal_more(
        &mut self,
    ) -> impl std::future::Future<Output = Result<(), HarvestError>> + Send;
}

/// Run parameters, passed in explicitly rather than read from ambient state.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub target_count: usize,
    pub max_reveals: usize,
    /// Wait after a reveal action so asynchronous content can finish
    /// rendering before the next snapshot.
    pub settle_delay: Duration,
    /// Overall run budget; checked at pass boundaries. Partial results up to
    /// the deadline are returned, never discarded.
    pub deadline: Option<Duration>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            target_count: 50,
            max_reveals: 5,
            settle_delay: Duration::from_secs(2),
            deadline: None,
        }
    }
}

/// Accumulator owned by one collection run. Never shared across runs.
#[derive(Debug)]
pub struct CollectionState {
    /// Insertion order = extraction order. Records are never un-accepted.
    pub collected: Vec<ParsedReview>,
    seen_keys: HashSet<String>,
    pub pass_count: usize,
    pub target_count: usize,
    pub no_new_content_streak: usize,
}

impl CollectionState {
    pub fn new(target_count: usize) -> Self {
        Self {
            collected: Vec::new(),
            seen_keys: HashSet::new(),
            pass_count: 0,
            target_count,
            no_new_content_streak: 0,
        }
    }

    pub fn is_new(&self, review: &ParsedReview) -> bool {
        !self.seen_keys.contains(&dedup::dedup_key(review))
    }

    /// Append a review unless its key is already registered. Key
    /// registration and insertion happen together, so no duplicate can land
    /// even if passes are re-ordered.
    pub fn record(&mut self, review: ParsedReview) -> bool {
        let key = dedup::dedup_key(&review);
        if !self.seen_keys.insert(key) {
            return false;
        }
        self.collected.push(review);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStatus {
    TargetReached,
    /// Consecutive passes stopped producing new records.
    ContentExhausted,
    /// Reveal budget spent. A normal terminal condition, not an error.
    RevealBudgetExhausted,
    /// No block ever classified as a review candidate. Distinguishable
    /// "no data" terminal, still not an error.
    NoCandidates,
    DeadlineReached,
    /// The collaborator failed mid-run; collected results were kept.
    CollaboratorLost,
}

impl HarvestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarvestStatus::TargetReached => "target_reached",
            HarvestStatus::ContentExhausted => "content_exhausted",
            HarvestStatus::RevealBudgetExhausted => "reveal_budget_exhausted",
            HarvestStatus::NoCandidates => "no_candidates",
            HarvestStatus::DeadlineReached => "deadline_reached",
            HarvestStatus::CollaboratorLost => "collaborator_lost",
        }
    }
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct HarvestOutcome {
    pub reviews: Vec<ParsedReview>,
    pub status: HarvestStatus,
    pub passes: usize,
    pub parse_failures: usize,
}

/// Counters from a single scanning pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassReport {
    pub candidates: usize,
    pub parse_failures: usize,
    pub new_records: usize,
}

/// One scanning pass: filter the snapshot to candidates, extract fields in
/// parallel, then merge serially in observed order.
///
/// Extraction is pure per block, so blocks run through rayon; the collect
/// preserves snapshot order and the dedup/append step below is the single
/// serialized point.
pub fn scan_pass(state: &mut CollectionState, blocks: &[RawBlock]) -> PassReport {
    state.pass_count += 1;
    let mut report = PassReport::default();

    let candidates: Vec<&RawBlock> = blocks.iter().filter(|b| filter::classify(b)).collect();
    report.candidates = candidates.len();

    let parsed: Vec<Result<ParsedReview, ParseFailure>> =
        candidates.par_iter().map(|b| extract::extract(b)).collect();

    for result in parsed {
        if state.collected.len() >= state.target_count {
            break;
        }
        match result {
            Ok(review) => {
                if state.record(review) {
                    report.new_records += 1;
                }
            }
            Err(e) => {
                debug!(error = %e, "skipping unparseable candidate");
                report.parse_failures += 1;
            }
        }
    }

    if report.new_records == 0 {
        state.no_new_content_streak += 1;
    } else {
        state.no_new_content_streak = 0;
    }

    debug!(
        pass = state.pass_count,
        candidates = report.candidates,
        new = report.new_records,
        failures = report.parse_failures,
        total = state.collected.len(),
        "scan pass complete"
    );
    report
}

/// Drive reveal/scan cycles against the collaborator until the target count
/// is met or the page stops producing new content.
///
/// Scanning and revealing alternate strictly: a reveal completes and the
/// settle delay elapses before the next snapshot is taken. The collected
/// sequence is monotonically non-decreasing across passes, and partial
/// results are always returned.
pub async fn run<S: ReviewSource>(
    source: &mut S,
    config: &CollectionConfig,
) -> Result<HarvestOutcome, HarvestError> {
    let started = Instant::now();
    let mut state = CollectionState::new(config.target_count);
    let mut candidates_seen = 0usize;
    let mut parse_failures = 0usize;

    let pb = ProgressBar::new(config.target_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} reviews ({per_sec})")
            .unwrap()
            .progress_chars("=> "),
    );

    // Idle -> Scanning. A failure here means the run never started.
    let blocks = match source.visible_blocks().await {
        Ok(blocks) => blocks,
        Err(e) => return Err(HarvestError::CollaboratorUnavailable(e.to_string())),
    };
    let report = scan_pass(&mut state, &blocks);
    candidates_seen += report.candidates;
    parse_failures += report.parse_failures;
    pb.set_position(state.collected.len().min(config.target_count) as u64);

    let mut reveals_used = 0usize;
    let status = loop {
        if state.collected.len() >= config.target_count {
            break HarvestStatus::TargetReached;
        }
        if state.no_new_content_streak >= NO_NEW_STREAK_LIMIT {
            break if candidates_seen == 0 {
                HarvestStatus::NoCandidates
            } else {
                HarvestStatus::ContentExhausted
            };
        }
        if reveals_used >= config.max_reveals {
            break if candidates_seen == 0 {
                HarvestStatus::NoCandidates
            } else {
                HarvestStatus::RevealBudgetExhausted
            };
        }
        if config
            .deadline
            .is_some_and(|limit| started.elapsed() >= limit)
        {
            break HarvestStatus::DeadlineReached;
        }

        // Scanning -> Revealing
        if let Err(e) = source.reveal_more().await {
            warn!(error = %e, "reveal action failed, keeping partial results");
            break HarvestStatus::CollaboratorLost;
        }
        reveals_used += 1;
        tokio::time::sleep(config.settle_delay).await;

        // Revealing -> Scanning
        match source.visible_blocks().await {
            Ok(blocks) => {
                let report = scan_pass(&mut state, &blocks);
                candidates_seen += report.candidates;
                parse_failures += report.parse_failures;
                pb.set_position(state.collected.len().min(config.target_count) as u64);
            }
            Err(e) => {
                warn!(error = %e, "snapshot failed, keeping partial results");
                break HarvestStatus::CollaboratorLost;
            }
        }
    };
    pb.finish_and_clear();

    info!(
        collected = state.collected.len(),
        passes = state.pass_count,
        reveals = reveals_used,
        parse_failures,
        status = %status,
        "collection run finished"
    );

    Ok(HarvestOutcome {
        reviews: state.collected,
        status,
        passes: state.pass_count,
        parse_failures,
    })
}
