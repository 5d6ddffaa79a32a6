//! Pool credential models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a pool credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CredentialId(pub String);

impl CredentialId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CredentialId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CredentialId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Added but never served a request
    #[default]
    Pending,
    /// Served at least one request
    Active,
    /// Rejected by the upstream; never dispatched to
    Invalid,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Pending => "pending",
            CredentialStatus::Active => "active",
            CredentialStatus::Invalid => "invalid",
        }
    }

    /// Whether the dispatcher may send requests with this credential.
    pub fn is_usable(&self) -> bool {
        !matches!(self, CredentialStatus::Invalid)
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An API secret granting access to the upstream generator.
#[derive(Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Credential {
    pub id: CredentialId,

    /// Raw API key. Never logged.
    pub secret: String,

    #[serde(default)]
    pub status: CredentialStatus,

    /// Last time the status was changed or confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a new pending credential.
    pub fn new(id: impl Into<CredentialId>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            status: CredentialStatus::Pending,
            last_checked_at: None,
        }
    }

    pub fn with_status(mut self, status: CredentialStatus) -> Self {
        self.status = status;
        self
    }

    /// Secret with everything but the last four characters masked.
    pub fn masked_secret(&self) -> String {
        let visible: String = self
            .secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{}", visible)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &self.masked_secret())
            .field("status", &self.status)
            .field("last_checked_at", &self.last_checked_at)
            .finish()
    }
}
