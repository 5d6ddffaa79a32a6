//! Credential registry boundary.
//!
//! The dispatcher only enumerates credentials, evicts dead ones and promotes
//! pending ones. Provisioning happens elsewhere. Implementations must keep a
//! stable enumeration order and make `evict` idempotent.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use clipgen_models::{Credential, CredentialId, CredentialStatus};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{DispatchError, DispatchResult};

#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// All credentials in stable registry order.
    async fn list_all(&self) -> DispatchResult<Vec<Credential>>;

    /// Permanently remove a credential. Returns `false` if it was not present.
    async fn evict(&self, id: &CredentialId) -> DispatchResult<bool>;

    /// Update a credential's status. Unknown ids are ignored.
    async fn set_status(&self, id: &CredentialId, status: CredentialStatus) -> DispatchResult<()>;
}

fn apply_status(credentials: &mut [Credential], id: &CredentialId, status: CredentialStatus) -> bool {
    match credentials.iter_mut().find(|c| &c.id == id) {
        Some(credential) => {
            credential.status = status;
            credential.last_checked_at = Some(Utc::now());
            true
        }
        None => false,
    }
}

fn remove(credentials: &mut Vec<Credential>, id: &CredentialId) -> bool {
    match credentials.iter().position(|c| &c.id == id) {
        Some(index) => {
            credentials.remove(index);
            true
        }
        None => false,
    }
}

/// Process-local registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    credentials: RwLock<Vec<Credential>>,
}

impl InMemoryRegistry {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    /// Append a credential, replacing any existing one with the same id.
    pub async fn insert(&self, credential: Credential) {
        let mut credentials = self.credentials.write().await;
        remove(&mut credentials, &credential.id);
        credentials.push(credential);
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialRegistry for InMemoryRegistry {
    async fn list_all(&self) -> DispatchResult<Vec<Credential>> {
        Ok(self.credentials.read().await.clone())
    }

    async fn evict(&self, id: &CredentialId) -> DispatchResult<bool> {
        let mut credentials = self.credentials.write().await;
        Ok(remove(&mut credentials, id))
    }

    async fn set_status(&self, id: &CredentialId, status: CredentialStatus) -> DispatchResult<()> {
        let mut credentials = self.credentials.write().await;
        if !apply_status(&mut credentials, id, status) {
            debug!(credential_id = %id, "Status update for unknown credential ignored");
        }
        Ok(())
    }
}

/// Registry persisted as a JSON array of credentials.
///
/// Every mutation rewrites the file through a temp file and rename while the
/// write lock is held, so the file never shows a half-applied change.
pub struct JsonFileRegistry {
    path: PathBuf,
    credentials: RwLock<Vec<Credential>>,
}

impl JsonFileRegistry {
    /// Load the registry from `path`. A missing file is an empty registry.
    pub async fn open(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let path = path.as_ref().to_path_buf();
        let credentials = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice::<Vec<Credential>>(&bytes).map_err(|e| {
                DispatchError::registry(format!(
                    "Invalid credentials file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), count = credentials.len(), "Loaded credential registry");
        Ok(Self {
            path,
            credentials: RwLock::new(credentials),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, credentials: &[Credential]) -> DispatchResult<()> {
        let json = serde_json::to_vec_pretty(credentials)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialRegistry for JsonFileRegistry {
    async fn list_all(&self) -> DispatchResult<Vec<Credential>> {
        Ok(self.credentials.read().await.clone())
    }

    async fn evict(&self, id: &CredentialId) -> DispatchResult<bool> {
        let mut credentials = self.credentials.write().await;
        // Stage on a copy so a failed write leaves memory matching the file
        let mut staged = credentials.clone();
        if !remove(&mut staged, id) {
            return Ok(false);
        }
        self.persist(&staged).await?;
        *credentials = staged;
        Ok(true)
    }

    async fn set_status(&self, id: &CredentialId, status: CredentialStatus) -> DispatchResult<()> {
        let mut credentials = self.credentials.write().await;
        let mut staged = credentials.clone();
        if !apply_status(&mut staged, id, status) {
            debug!(credential_id = %id, "Status update for unknown credential ignored");
            return Ok(());
        }
        self.persist(&staged).await?;
        *credentials = staged;
        Ok(())
    }
}
