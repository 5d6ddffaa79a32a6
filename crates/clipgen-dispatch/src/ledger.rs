//! Usage ledger boundary.
//!
//! Append-only sink for attempt outcomes. The dispatcher never reads it and
//! never lets a ledger failure change a dispatch result.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use clipgen_models::AttemptOutcome;
use tokio::io::AsyncWriteExt;

use crate::error::DispatchResult;

#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn record(&self, outcome: &AttemptOutcome) -> DispatchResult<()>;
}

/// Ledger kept in memory, mostly for tests and short-lived tools.
#[derive(Default)]
pub struct InMemoryLedger {
    outcomes: Mutex<Vec<AttemptOutcome>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, in record order.
    pub fn outcomes(&self) -> Vec<AttemptOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UsageLedger for InMemoryLedger {
    async fn record(&self, outcome: &AttemptOutcome) -> DispatchResult<()> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome.clone());
        Ok(())
    }
}

/// Ledger appended to a JSON-lines file, one outcome per line.
pub struct JsonlLedger {
    path: PathBuf,
    // Serializes appends so lines from concurrent calls never interleave
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UsageLedger for JsonlLedger {
    async fn record(&self, outcome: &AttemptOutcome) -> DispatchResult<()> {
        let mut line = serde_json::to_vec(outcome)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
