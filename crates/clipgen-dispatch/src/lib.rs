//! Credential-pool dispatcher for AI clip suggestions.
//!
//! Admits a user's request through a per-user throttle, then tries pooled
//! upstream credentials in registry order until one produces suggestions.
//! Failures are classified to decide between retrying, cooling a credential
//! down, evicting it, or giving up. Every attempt lands in the usage ledger.

pub mod backoff;
pub mod classify;
pub mod config;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod normalizer;
pub mod registry;
pub mod throttle;
pub mod upstream;

pub use backoff::BackoffPolicy;
pub use classify::{classify, FailureClass};
pub use config::DispatchConfig;
pub use cooldown::{ActiveCooldown, CredentialCooldownTracker};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult, ParseError};
pub use ledger::{InMemoryLedger, JsonlLedger, UsageLedger};
pub use normalizer::{CandidateParser, ResponseNormalizer};
pub use registry::{CredentialRegistry, InMemoryRegistry, JsonFileRegistry};
pub use throttle::{Admission, UserThrottle};
pub use upstream::{GeminiClient, GeminiConfig, UpstreamClient, UpstreamError, UpstreamErrorKind};
pub use tokio_util::sync::CancellationToken;
