//! Dispatcher error types.

use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Upstream output that could not be turned into suggestions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Upstream returned a blank response")]
    Blank,

    #[error("No recoverable clip structure in upstream response")]
    NoStructure,

    #[error("All {0} candidate clips were missing valid start/end timestamps")]
    NoValidCandidates(usize),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Credential invalid: {0}")]
    CredentialInvalid(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Transient upstream error: {0}")]
    TransientUpstream(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{}", pool_exhausted_message(.last_error))]
    PoolExhausted { last_error: Option<String> },

    #[error("Dispatch cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn pool_exhausted_message(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!("All credentials exhausted, last error: {}", e),
        None => "All credentials exhausted, no usable credentials available".to_string(),
    }
}

impl DispatchError {
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn pool_exhausted(last_error: Option<String>) -> Self {
        Self::PoolExhausted { last_error }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Kinds that are handled inside the credential loop and only surface
    /// to callers as the last error of a `PoolExhausted`.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            DispatchError::CredentialInvalid(_)
                | DispatchError::QuotaExceeded(_)
                | DispatchError::TransientUpstream(_)
                | DispatchError::Parse(_)
        )
    }

    /// Kinds that `Dispatcher::generate` may return.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            DispatchError::RateLimited { .. }
                | DispatchError::ModelNotFound(_)
                | DispatchError::PoolExhausted { .. }
                | DispatchError::Cancelled
        )
    }

    /// Suggested delay before the caller retries, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            DispatchError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
