//! Upstream failure classification.
//!
//! The only place that inspects status codes and error text. Everything
//! downstream branches on [`FailureClass`].

use std::sync::OnceLock;

use regex::Regex;

use crate::upstream::{UpstreamError, UpstreamErrorKind};

/// What the dispatcher should do about a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Configured model does not exist. Every credential would fail.
    ModelNotFound,
    /// Credential revoked, leaked or malformed. Evict it.
    CredentialInvalid,
    /// Credential out of quota or rate limited. Cool it down.
    QuotaExceeded,
    /// Anything else. Retry with backoff.
    Transient,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::ModelNotFound => "model_not_found",
            FailureClass::CredentialInvalid => "credential_invalid",
            FailureClass::QuotaExceeded => "quota_exceeded",
            FailureClass::Transient => "transient",
        }
    }
}

fn model_not_found_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b404\b|model[^.\n]*not found|not[ _]found[^.\n]*model|no such model")
            .expect("valid model-not-found regex")
    })
}

fn quota_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // "rate" only as a word so "generate"/"moderate" do not match
        Regex::new(r"quota|\brate\b|\brate[-_ ]?limit|resource[_ ]exhausted|too many requests")
            .expect("valid quota regex")
    })
}

/// Classify a failed upstream call. Priority is fixed: model-not-found,
/// then invalid credential, then quota, then transient.
pub fn classify(error: &UpstreamError) -> FailureClass {
    if error.kind == UpstreamErrorKind::Timeout {
        return FailureClass::Transient;
    }

    let message = error.message.to_lowercase();

    if error.status == Some(404) || model_not_found_pattern().is_match(&message) {
        return FailureClass::ModelNotFound;
    }

    if error.status == Some(403)
        || message.contains("leaked")
        || message.contains("not valid")
        || message.contains("api_key_invalid")
    {
        return FailureClass::CredentialInvalid;
    }

    if error.status == Some(429) || quota_pattern().is_match(&message) {
        return FailureClass::QuotaExceeded;
    }

    FailureClass::Transient
}
