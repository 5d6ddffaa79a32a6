//! Attempt outcome records written to the usage ledger.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::credential::CredentialId;

/// Unique identifier for one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a single upstream attempt.
///
/// Records are write-once. The dispatcher emits one per attempt and never
/// reads them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    pub credential_id: CredentialId,
    pub user_id: String,
    pub request_label: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl AttemptOutcome {
    /// Record a successful attempt.
    pub fn succeeded(
        credential_id: CredentialId,
        user_id: impl Into<String>,
        request_label: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            credential_id,
            user_id: user_id.into(),
            request_label: request_label.into(),
            success: true,
            error_message: None,
            latency_ms,
            timestamp: Utc::now(),
        }
    }

    /// Record a failed attempt.
    pub fn failed(
        credential_id: CredentialId,
        user_id: impl Into<String>,
        request_label: impl Into<String>,
        error_message: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            credential_id,
            user_id: user_id.into(),
            request_label: request_label.into(),
            success: false,
            error_message: Some(error_message.into()),
            latency_ms,
            timestamp: Utc::now(),
        }
    }
}
