//! Shared data models for the clip suggestion dispatcher.
//!
//! This crate provides Serde-serializable types for:
//! - Pool credentials and their lifecycle status
//! - Clip suggestions produced from upstream model output
//! - Attempt outcomes written to the usage ledger
//! - Timestamp parsing and `MM:SS` formatting

pub mod credential;
pub mod outcome;
pub mod suggestion;
pub mod timestamp;

// Re-export common types
pub use credential::{Credential, CredentialId, CredentialStatus};
pub use outcome::{AttemptOutcome, RequestId};
pub use suggestion::ClipSuggestion;
pub use timestamp::TimestampError;
