//! Upstream generative-model boundary.

mod gemini;

pub use gemini::{GeminiClient, GeminiConfig};

use async_trait::async_trait;
use thiserror::Error;

/// How an upstream call failed at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Non-2xx HTTP status
    Http,
    /// Connection, TLS or request-building failure
    Transport,
    /// Call exceeded its deadline
    Timeout,
    /// 2xx response without usable text
    EmptyResponse,
}

/// Failure of a single upstream generation call.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", self.describe())]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Http,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Transport,
            status: None,
            message: message.into(),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self {
            kind: UpstreamErrorKind::Timeout,
            status: None,
            message: format!("upstream call timed out after {:?}", after),
        }
    }

    pub fn empty_response(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::EmptyResponse,
            status: None,
            message: message.into(),
        }
    }

    fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("upstream returned {}: {}", status, self.message),
            None => self.message.clone(),
        }
    }
}

/// A text generator reachable with a pool credential.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Run one generation with `secret` and return the raw response text.
    async fn generate(&self, secret: &str, prompt: &str) -> Result<String, UpstreamError>;
}
