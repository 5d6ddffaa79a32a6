//! Upstream text → validated clip suggestions.
//!
//! Two parsing tiers sit behind [`CandidateParser`]: strict JSON first, then
//! a line-oriented heuristic for free-text answers. Both only produce loose
//! [`RawCandidate`]s; a single post-processing step turns those into
//! [`ClipSuggestion`]s or drops them.
//!
//! An empty JSON array and the no-result sentinel are legitimate "nothing to
//! report" answers. Blank text and text without any recoverable candidate
//! are errors.

mod heuristic;
mod strict;

pub use heuristic::HeuristicLineParser;
pub use strict::{strip_code_fences, StrictJsonParser};

use clipgen_models::suggestion::{
    DEFAULT_CAPTION, DEFAULT_CONTENT_TYPE, DEFAULT_REASON, DEFAULT_VIRALITY_SCORE,
};
use clipgen_models::timestamp::normalize_mm_ss;
use clipgen_models::ClipSuggestion;
use tracing::debug;

use crate::error::ParseError;

/// Marker the upstream emits when there is nothing to analyze.
pub const NO_RESULT_SENTINEL: &str = "NO_TRANSCRIPT";

/// A suggestion as recovered from upstream text, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCandidate {
    pub start: Option<String>,
    pub end: Option<String>,
    pub score: Option<f64>,
    pub reason: Option<String>,
    pub caption: Option<String>,
    pub content_type: Option<String>,
    pub peak_moment: Option<String>,
}

impl RawCandidate {
    pub fn has_bounds(&self) -> bool {
        non_empty(self.start.as_deref()).is_some() && non_empty(self.end.as_deref()).is_some()
    }
}

/// One parsing tier.
pub trait CandidateParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when this tier finds no structure at all. `Some(vec![])` is a
    /// positive "no clips" answer.
    fn parse(&self, text: &str) -> Option<Vec<RawCandidate>>;
}

/// Runs the strict tier, then the heuristic tier, then validation.
pub struct ResponseNormalizer {
    strict: Box<dyn CandidateParser>,
    heuristic: Box<dyn CandidateParser>,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new(Box::new(StrictJsonParser), Box::new(HeuristicLineParser::default()))
    }
}

impl ResponseNormalizer {
    pub fn new(strict: Box<dyn CandidateParser>, heuristic: Box<dyn CandidateParser>) -> Self {
        Self { strict, heuristic }
    }

    pub fn normalize(&self, raw: &str) -> Result<Vec<ClipSuggestion>, ParseError> {
        let text = strip_code_fences(raw);
        if text.is_empty() {
            return Err(ParseError::Blank);
        }
        if is_sentinel(text) {
            debug!("Upstream reported no result");
            return Ok(Vec::new());
        }

        let candidates = match self.strict.parse(text) {
            Some(candidates) => candidates,
            None => {
                debug!(parser = self.heuristic.name(), "Strict parse failed, trying recovery");
                self.heuristic.parse(text).ok_or(ParseError::NoStructure)?
            }
        };

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let total = candidates.len();
        let suggestions: Vec<ClipSuggestion> =
            candidates.into_iter().filter_map(finalize).collect();
        if suggestions.is_empty() {
            return Err(ParseError::NoValidCandidates(total));
        }
        if suggestions.len() < total {
            debug!(kept = suggestions.len(), dropped = total - suggestions.len(), "Dropped invalid candidates");
        }
        Ok(suggestions)
    }
}

fn is_sentinel(text: &str) -> bool {
    text.trim_matches(|c: char| c == '"' || c.is_whitespace())
        .eq_ignore_ascii_case(NO_RESULT_SENTINEL)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn text_or(value: Option<&str>, default: &str) -> String {
    non_empty(value).unwrap_or(default).to_string()
}

/// Validate and default-fill one candidate. `None` drops it.
fn finalize(raw: RawCandidate) -> Option<ClipSuggestion> {
    let start = normalize_mm_ss(non_empty(raw.start.as_deref())?).ok()?;
    let end = normalize_mm_ss(non_empty(raw.end.as_deref())?).ok()?;
    let peak_moment = non_empty(raw.peak_moment.as_deref())
        .and_then(|p| normalize_mm_ss(p).ok())
        .unwrap_or_else(|| start.clone());

    Some(ClipSuggestion {
        start,
        end,
        virality_score: raw
            .score
            .filter(|s| s.is_finite())
            .unwrap_or(DEFAULT_VIRALITY_SCORE),
        reason: text_or(raw.reason.as_deref(), DEFAULT_REASON),
        caption: text_or(raw.caption.as_deref(), DEFAULT_CAPTION),
        content_type: text_or(raw.content_type.as_deref(), DEFAULT_CONTENT_TYPE),
        peak_moment,
    })
}
