//! Clip suggestion models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Score assigned when the upstream omits one.
pub const DEFAULT_VIRALITY_SCORE: f64 = 8.0;

/// Reason assigned when the upstream omits one.
pub const DEFAULT_REASON: &str = "Engaging moment with strong viral potential";

/// Caption assigned when the upstream omits one.
pub const DEFAULT_CAPTION: &str = "Check out this moment!";

/// Content type assigned when the upstream omits one.
pub const DEFAULT_CONTENT_TYPE: &str = "general";

/// A validated clip suggestion.
///
/// Only produced by the response normalizer: `start`, `end` and
/// `peak_moment` are always `MM:SS`, every text field is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClipSuggestion {
    /// Start timestamp (MM:SS)
    pub start: String,

    /// End timestamp (MM:SS)
    pub end: String,

    pub virality_score: f64,

    /// Why this segment should perform well
    pub reason: String,

    /// Social media caption
    pub caption: String,

    /// Free-form category (e.g. "funny", "educational")
    pub content_type: String,

    /// Most engaging instant within the clip (MM:SS)
    pub peak_moment: String,
}

impl ClipSuggestion {
    /// Create a suggestion with default metadata.
    ///
    /// Callers are expected to pass already-normalized `MM:SS` values.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        let start = start.into();
        Self {
            peak_moment: start.clone(),
            start,
            end: end.into(),
            virality_score: DEFAULT_VIRALITY_SCORE,
            reason: DEFAULT_REASON.to_string(),
            caption: DEFAULT_CAPTION.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}
