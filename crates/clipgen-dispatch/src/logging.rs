//! Structured dispatch logging utilities.
//!
//! Every dispatch call gets a request id so its attempts can be followed
//! across credentials in the logs. Secrets never pass through here.

use clipgen_models::{CredentialId, RequestId};
use tracing::{debug, error, info, warn, Span};

/// Logger bound to one dispatch call.
#[derive(Debug, Clone)]
pub struct DispatchLogger {
    request_id: RequestId,
    user_id: String,
    label: String,
}

impl DispatchLogger {
    pub fn new(user_id: &str, label: &str) -> Self {
        Self {
            request_id: RequestId::new(),
            user_id: user_id.to_string(),
            label: label.to_string(),
        }
    }

    pub fn log_start(&self, candidates: usize) {
        info!(
            request_id = %self.request_id,
            user_id = %self.user_id,
            label = %self.label,
            candidates,
            "Dispatch started"
        );
    }

    pub fn log_attempt_failed(
        &self,
        credential_id: &CredentialId,
        attempt: u32,
        class: &str,
        message: &str,
    ) {
        warn!(
            request_id = %self.request_id,
            credential_id = %credential_id,
            attempt,
            class,
            "Attempt failed: {}", message
        );
    }

    pub fn log_skip(&self, credential_id: &CredentialId, reason: &str) {
        debug!(
            request_id = %self.request_id,
            credential_id = %credential_id,
            "Skipping credential: {}", reason
        );
    }

    pub fn log_served(&self, credential_id: &CredentialId, attempt: u32, clips: usize) {
        info!(
            request_id = %self.request_id,
            user_id = %self.user_id,
            credential_id = %credential_id,
            attempt,
            clips,
            "Dispatch served"
        );
    }

    pub fn log_failure(&self, message: &str) {
        error!(
            request_id = %self.request_id,
            user_id = %self.user_id,
            label = %self.label,
            "Dispatch failed: {}", message
        );
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Span covering the whole call.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "dispatch",
            request_id = %self.request_id,
            user_id = %self.user_id,
            label = %self.label
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_fields() {
        let logger = DispatchLogger::new("user-1", "clip_suggestions");
        assert_eq!(logger.user_id(), "user-1");
        assert_eq!(logger.label(), "clip_suggestions");
        assert!(!logger.request_id().as_str().is_empty());
    }

    #[test]
    fn test_each_logger_gets_own_request_id() {
        let a = DispatchLogger::new("u", "l");
        let b = DispatchLogger::new("u", "l");
        assert_ne!(a.request_id(), b.request_id());
    }
}
