//! Per-credential cooldown tracking.
//!
//! A credential that hit a quota signal is disabled for a fixed duration.
//! Expired entries are dropped lazily on lookup, so no background sweep is
//! needed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clipgen_models::CredentialId;
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use crate::metrics;

#[derive(Debug, Clone)]
struct CooldownEntry {
    until: Instant,
    expires_at: DateTime<Utc>,
    reason: String,
}

/// Snapshot of one active cooldown, for operator views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveCooldown {
    pub credential_id: CredentialId,
    pub reason: String,
    pub remaining_secs: u64,
    pub expires_at: DateTime<Utc>,
}

/// One credential's slot. `None` once the cooldown lapsed or was cleared.
#[derive(Debug, Default)]
struct CooldownSlot {
    entry: Option<CooldownEntry>,
}

impl CooldownSlot {
    /// The entry if still active; drops it when expired.
    fn active(&mut self, now: Instant) -> Option<&CooldownEntry> {
        if self.entry.as_ref().is_some_and(|entry| now >= entry.until) {
            self.entry = None;
        }
        self.entry.as_ref()
    }
}

/// Circuit breaker over pool credentials.
///
/// Each credential has its own slot mutex; the outer map lock is only taken
/// for writing the first time a credential is marked.
pub struct CredentialCooldownTracker {
    slots: RwLock<HashMap<CredentialId, Arc<Mutex<CooldownSlot>>>>,
    duration: Duration,
}

impl CredentialCooldownTracker {
    pub fn new(duration: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            duration,
        }
    }

    fn existing_slot(&self, id: &CredentialId) -> Option<Arc<Mutex<CooldownSlot>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(Arc::clone)
    }

    fn slot(&self, id: &CredentialId) -> Arc<Mutex<CooldownSlot>> {
        if let Some(slot) = self.existing_slot(id) {
            return slot;
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        // Double-check after acquiring write lock
        Arc::clone(slots.entry(id.clone()).or_default())
    }

    /// Whether `id` is currently disabled. Drops the entry if it expired.
    pub fn is_cooling_down(&self, id: &CredentialId) -> bool {
        let Some(slot) = self.existing_slot(id) else {
            return false;
        };
        let now = Instant::now();
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.active(now).is_some()
    }

    /// Disable `id` for the configured duration.
    ///
    /// Returns `false` if it was already cooling down; the existing deadline
    /// is kept.
    pub fn mark_cooling_down(&self, id: &CredentialId, reason: impl Into<String>) -> bool {
        let slot = self.slot(id);
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if slot.active(now).is_some() {
            return false;
        }

        let reason = reason.into();
        info!(
            credential_id = %id,
            cooldown_secs = self.duration.as_secs(),
            reason = %reason,
            "Credential cooling down"
        );
        slot.entry = Some(CooldownEntry {
            until: now + self.duration,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.duration).unwrap_or(chrono::Duration::MAX),
            reason,
        });
        metrics::record_cooldown();
        true
    }

    /// Whole seconds left on the cooldown, rounded up. Zero if not cooling.
    pub fn remaining_secs(&self, id: &CredentialId) -> u64 {
        let Some(slot) = self.existing_slot(id) else {
            return 0;
        };
        let now = Instant::now();
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.active(now)
            .map(|entry| remaining(entry.until, now))
            .unwrap_or(0)
    }

    /// All unexpired cooldowns, ordered by credential id.
    pub fn list_active_cooldowns(&self) -> Vec<ActiveCooldown> {
        let now = Instant::now();
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<ActiveCooldown> = slots
            .iter()
            .filter_map(|(id, slot)| {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                slot.active(now).map(|entry| ActiveCooldown {
                    credential_id: id.clone(),
                    reason: entry.reason.clone(),
                    remaining_secs: remaining(entry.until, now),
                    expires_at: entry.expires_at,
                })
            })
            .collect();
        active.sort_by(|a, b| a.credential_id.cmp(&b.credential_id));
        active
    }

    /// Lift a cooldown early. Returns whether an active entry was removed.
    pub fn clear(&self, id: &CredentialId) -> bool {
        let Some(slot) = self.existing_slot(id) else {
            return false;
        };
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let was_active = slot.active(Instant::now()).is_some();
        slot.entry = None;
        was_active
    }
}

fn remaining(until: Instant, now: Instant) -> u64 {
    let left = until.saturating_duration_since(now);
    let secs = left.as_secs();
    if left.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
