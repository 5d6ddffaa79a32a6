//! Credential-pool dispatcher.
//!
//! One call walks the registry in order. Each usable credential gets up to
//! `max_attempts` tries; the failure class of each try decides whether to
//! retry, move on, or give up on the whole call:
//!
//! | class              | effect                                  |
//! |--------------------|-----------------------------------------|
//! | model not found    | abort the call                          |
//! | credential invalid | evict, next credential                  |
//! | quota exceeded     | cool down, next credential              |
//! | transient / parse  | back off and retry, then next credential |
//!
//! The registry is re-read before every credential selection so evictions
//! and cooldowns committed by concurrent calls are honored immediately.

use std::collections::HashSet;
use std::sync::Arc;

use clipgen_models::{
    AttemptOutcome, ClipSuggestion, Credential, CredentialId, CredentialStatus,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::backoff::BackoffPolicy;
use crate::classify::{classify, FailureClass};
use crate::config::DispatchConfig;
use crate::cooldown::CredentialCooldownTracker;
use crate::error::{DispatchError, DispatchResult};
use crate::ledger::UsageLedger;
use crate::logging::DispatchLogger;
use crate::metrics;
use crate::normalizer::ResponseNormalizer;
use crate::registry::CredentialRegistry;
use crate::throttle::UserThrottle;
use crate::upstream::{UpstreamClient, UpstreamError};

/// Result of one upstream attempt.
enum AttemptVerdict {
    Served(Vec<ClipSuggestion>),
    Failed {
        class: FailureClass,
        error: DispatchError,
    },
}

/// Result of working one credential until it serves or is given up on.
enum CredentialVerdict {
    Served {
        clips: Vec<ClipSuggestion>,
        attempt: u32,
    },
    /// This credential is done for this call; try the next one.
    Advance(DispatchError),
    /// Stop the whole call.
    Abort(DispatchError),
}

/// Per-call state that does not change across credentials.
struct CallContext<'a> {
    prompt: &'a str,
    logger: DispatchLogger,
}

/// Dispatches generation requests over a shared credential pool.
///
/// Cheap to share behind an `Arc`; every piece of mutable state lives in the
/// injected throttle, cooldown tracker and registry.
pub struct Dispatcher {
    config: DispatchConfig,
    backoff: BackoffPolicy,
    throttle: Arc<UserThrottle>,
    cooldowns: Arc<CredentialCooldownTracker>,
    registry: Arc<dyn CredentialRegistry>,
    upstream: Arc<dyn UpstreamClient>,
    ledger: Arc<dyn UsageLedger>,
    normalizer: ResponseNormalizer,
}

impl Dispatcher {
    /// Create a dispatcher with fresh throttle and cooldown state.
    pub fn new(
        config: DispatchConfig,
        registry: Arc<dyn CredentialRegistry>,
        upstream: Arc<dyn UpstreamClient>,
        ledger: Arc<dyn UsageLedger>,
    ) -> Self {
        Self {
            backoff: BackoffPolicy::from_config(&config),
            throttle: Arc::new(UserThrottle::new(config.user_max_requests, config.user_window)),
            cooldowns: Arc::new(CredentialCooldownTracker::new(config.cooldown_duration)),
            config,
            registry,
            upstream,
            ledger,
            normalizer: ResponseNormalizer::default(),
        }
    }

    /// Share a throttle with other dispatchers.
    pub fn with_throttle(mut self, throttle: Arc<UserThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Share a cooldown tracker with other dispatchers.
    pub fn with_cooldowns(mut self, cooldowns: Arc<CredentialCooldownTracker>) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    pub fn with_normalizer(mut self, normalizer: ResponseNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn throttle(&self) -> &Arc<UserThrottle> {
        &self.throttle
    }

    pub fn cooldowns(&self) -> &Arc<CredentialCooldownTracker> {
        &self.cooldowns
    }

    /// Generate clip suggestions for `prompt` on behalf of `user_id`.
    pub async fn generate(&self, prompt: &str, user_id: &str) -> DispatchResult<Vec<ClipSuggestion>> {
        self.generate_labeled(prompt, user_id, &self.config.request_label)
            .await
    }

    /// Like [`generate`](Self::generate), with a custom ledger label.
    pub async fn generate_labeled(
        &self,
        prompt: &str,
        user_id: &str,
        label: &str,
    ) -> DispatchResult<Vec<ClipSuggestion>> {
        self.run(prompt, user_id, label).await
    }

    /// Like [`generate`](Self::generate), stopping with
    /// [`DispatchError::Cancelled`] at the next await point once `cancel`
    /// fires. In-flight upstream requests are dropped.
    pub async fn generate_with_cancel(
        &self,
        prompt: &str,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> DispatchResult<Vec<ClipSuggestion>> {
        self.generate_labeled_with_cancel(prompt, user_id, &self.config.request_label, cancel)
            .await
    }

    /// Cancellable [`generate_labeled`](Self::generate_labeled).
    pub async fn generate_labeled_with_cancel(
        &self,
        prompt: &str,
        user_id: &str,
        label: &str,
        cancel: &CancellationToken,
    ) -> DispatchResult<Vec<ClipSuggestion>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(user_id = %user_id, label = %label, "Dispatch cancelled by caller");
                Err(DispatchError::Cancelled)
            }
            result = self.run(prompt, user_id, label) => result,
        }
    }

    async fn run(
        &self,
        prompt: &str,
        user_id: &str,
        label: &str,
    ) -> DispatchResult<Vec<ClipSuggestion>> {
        let admission = self.throttle.admit(user_id);
        if !admission.allowed {
            return Err(DispatchError::rate_limited(admission.retry_after_secs));
        }

        let ctx = CallContext {
            prompt,
            logger: DispatchLogger::new(user_id, label),
        };
        let span = ctx.logger.create_span();

        let result = self.run_pool(&ctx).instrument(span).await;
        if let Err(e) = &result {
            debug_assert!(e.is_user_visible(), "internal error escaped dispatch: {e}");
            if matches!(e, DispatchError::PoolExhausted { .. }) {
                metrics::record_pool_exhausted();
            }
            ctx.logger.log_failure(&e.to_string());
        }
        result
    }

    async fn list_credentials(&self) -> DispatchResult<Vec<Credential>> {
        self.registry.list_all().await.inspect_err(|e| {
            warn!(error = %e, "Credential registry unavailable");
        })
    }

    /// Pick the next credential in registry order that has not been seen in
    /// this call and is currently usable. Skipped credentials count as seen.
    fn select_next(
        &self,
        pool: Vec<Credential>,
        seen: &mut HashSet<CredentialId>,
        skipped: &mut usize,
        ctx: &CallContext<'_>,
    ) -> Option<Credential> {
        for credential in pool {
            if !seen.insert(credential.id.clone()) {
                continue;
            }
            if !credential.status.is_usable() {
                ctx.logger.log_skip(&credential.id, "marked invalid");
                *skipped += 1;
                continue;
            }
            if self.cooldowns.is_cooling_down(&credential.id) {
                ctx.logger.log_skip(&credential.id, "cooling down");
                *skipped += 1;
                continue;
            }
            return Some(credential);
        }
        None
    }

    async fn run_pool(&self, ctx: &CallContext<'_>) -> DispatchResult<Vec<ClipSuggestion>> {
        let mut pool = Some(
            self.list_credentials()
                .await
                .map_err(|e| DispatchError::pool_exhausted(Some(e.to_string())))?,
        );
        ctx.logger
            .log_start(pool.as_ref().map(Vec::len).unwrap_or_default());

        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let mut last_error: Option<DispatchError> = None;

        loop {
            let current = match pool.take() {
                Some(p) => p,
                None => match self.list_credentials().await {
                    Ok(p) => p,
                    // Keep the failure already observed on an earlier credential
                    Err(e) => {
                        last_error.get_or_insert(e);
                        break;
                    }
                },
            };
            let Some(credential) = self.select_next(current, &mut seen, &mut skipped, ctx) else {
                break;
            };

            match self.run_credential(&credential, ctx).await {
                CredentialVerdict::Served { clips, attempt } => {
                    ctx.logger.log_served(&credential.id, attempt, clips.len());
                    self.promote(&credential).await;
                    return Ok(clips);
                }
                CredentialVerdict::Advance(error) => {
                    debug_assert!(error.is_locally_recoverable());
                    last_error = Some(error);
                }
                CredentialVerdict::Abort(error) => return Err(error),
            }
        }

        let last_error = match last_error {
            Some(e) => Some(e.to_string()),
            None if skipped > 0 => Some(format!("{} credential(s) unavailable (cooling down or invalid)", skipped)),
            None => None,
        };
        Err(DispatchError::pool_exhausted(last_error))
    }

    async fn run_credential(
        &self,
        credential: &Credential,
        ctx: &CallContext<'_>,
    ) -> CredentialVerdict {
        let mut attempt = 1;
        loop {
            let error = match self.attempt(credential, attempt, ctx).await {
                AttemptVerdict::Served(clips) => return CredentialVerdict::Served { clips, attempt },
                AttemptVerdict::Failed { class, error } => {
                    ctx.logger
                        .log_attempt_failed(&credential.id, attempt, class.as_str(), &error.to_string());
                    match class {
                        FailureClass::ModelNotFound => return CredentialVerdict::Abort(error),
                        FailureClass::CredentialInvalid => {
                            self.evict(&credential.id).await;
                            return CredentialVerdict::Advance(error);
                        }
                        FailureClass::QuotaExceeded => {
                            self.cooldowns
                                .mark_cooling_down(&credential.id, error.to_string());
                            return CredentialVerdict::Advance(error);
                        }
                        FailureClass::Transient => error,
                    }
                }
            };

            if !self.backoff.has_attempts_after(attempt) {
                return CredentialVerdict::Advance(error);
            }
            let delay = self.backoff.delay_after(attempt);
            debug!(
                credential_id = %credential.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        credential: &Credential,
        attempt: u32,
        ctx: &CallContext<'_>,
    ) -> AttemptVerdict {
        debug!(credential_id = %credential.id, attempt, "Calling upstream");
        let started = Instant::now();
        let timeout = self.config.upstream_timeout;
        let result = tokio::time::timeout(
            timeout,
            self.upstream.generate(&credential.secret, ctx.prompt),
        )
        .await
        .unwrap_or_else(|_| Err(UpstreamError::timeout(timeout)));
        let latency_ms = started.elapsed().as_millis() as u64;

        let verdict = match result {
            Ok(text) => match self.normalizer.normalize(&text) {
                Ok(clips) => AttemptVerdict::Served(clips),
                Err(parse) => AttemptVerdict::Failed {
                    class: FailureClass::Transient,
                    error: DispatchError::Parse(parse),
                },
            },
            Err(upstream) => {
                let class = classify(&upstream);
                let message = upstream.to_string();
                let error = match class {
                    FailureClass::ModelNotFound => DispatchError::ModelNotFound(message),
                    FailureClass::CredentialInvalid => DispatchError::CredentialInvalid(message),
                    FailureClass::QuotaExceeded => DispatchError::QuotaExceeded(message),
                    FailureClass::Transient => DispatchError::TransientUpstream(message),
                };
                AttemptVerdict::Failed { class, error }
            }
        };

        let outcome = match &verdict {
            AttemptVerdict::Served(_) => {
                metrics::record_attempt("success", true, latency_ms);
                AttemptOutcome::succeeded(
                    credential.id.clone(),
                    ctx.logger.user_id(),
                    ctx.logger.label(),
                    latency_ms,
                )
            }
            AttemptVerdict::Failed { class, error } => {
                metrics::record_attempt(class.as_str(), false, latency_ms);
                AttemptOutcome::failed(
                    credential.id.clone(),
                    ctx.logger.user_id(),
                    ctx.logger.label(),
                    error.to_string(),
                    latency_ms,
                )
            }
        };
        self.record(&outcome).await;

        verdict
    }

    async fn record(&self, outcome: &AttemptOutcome) {
        if let Err(e) = self.ledger.record(outcome).await {
            warn!(
                credential_id = %outcome.credential_id,
                error = %e,
                "Failed to record attempt outcome"
            );
        }
    }

    async fn evict(&self, id: &CredentialId) {
        match self.registry.evict(id).await {
            Ok(true) => {
                metrics::record_eviction();
                info!(credential_id = %id, "Credential evicted");
            }
            Ok(false) => debug!(credential_id = %id, "Credential already evicted"),
            Err(e) => warn!(credential_id = %id, error = %e, "Failed to evict credential"),
        }
    }

    async fn promote(&self, credential: &Credential) {
        if credential.status != CredentialStatus::Pending {
            return;
        }
        if let Err(e) = self
            .registry
            .set_status(&credential.id, CredentialStatus::Active)
            .await
        {
            warn!(credential_id = %credential.id, error = %e, "Failed to activate credential");
        }
    }
}
