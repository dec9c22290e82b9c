//! Credential store and its persistent cache.
//!
//! [`CredentialStore`] is the single owner of the session. It drives the
//! pure [`SessionState`] machine, writes the credential through a
//! [`CredentialCache`], and publishes every change on a watch channel.
//! Persistence failures are logged and never returned: a session that
//! cannot be cached still works for the lifetime of the process.

use async_trait::async_trait;
use chatify_core::{Epoch, SessionAction, SessionEvent, SessionState};
use chatify_types::{Credential, CredentialRecord, Profile};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use thiserror::Error;
use tokio::sync::{watch, Mutex};

/// Credential cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the cache file failed.
    #[error("credential cache I/O error at {path}: {source}")]
    Io {
        /// Cache file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The cached record could not be encoded or decoded.
    #[error("credential cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable key-value storage for the credential record.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// Read the stored record. A missing record is `Ok(None)`.
    async fn load(&self) -> Result<Option<CredentialRecord>, CacheError>;

    /// Replace the stored record.
    async fn save(&self, record: &CredentialRecord) -> Result<(), CacheError>;

    /// Remove the stored record. Removing nothing is not an error.
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Credential cache backed by a JSON file with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileCredentialCache {
    path: PathBuf,
}

impl FileCredentialCache {
    /// Create a cache that stores the record at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl CredentialCache for FileCredentialCache {
    async fn load(&self) -> Result<Option<CredentialRecord>, CacheError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let contents = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| self.io_error(e))?;
        set_file_permissions_0600(&self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// In-process credential cache, for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialCache {
    record: Arc<StdMutex<Option<CredentialRecord>>>,
}

impl MemoryCredentialCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache that already holds `record`.
    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: Arc::new(StdMutex::new(Some(record))),
        }
    }

    /// The stored record, if any.
    pub fn stored(&self) -> Option<CredentialRecord> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CredentialCache for MemoryCredentialCache {
    async fn load(&self) -> Result<Option<CredentialRecord>, CacheError> {
        Ok(self.stored())
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), CacheError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Owner of the session credential.
///
/// Mutations go through [`set`](Self::set), [`update_profile`](Self::update_profile),
/// [`clear`](Self::clear) and [`account_deleted`](Self::account_deleted). Each
/// returns the session actions the caller still has to carry out (dropping
/// the ticket, resetting messages); persistence and notification are done
/// here.
pub struct CredentialStore {
    state: Mutex<SessionState>,
    cache: Arc<dyn CredentialCache>,
    current: watch::Sender<Option<Credential>>,
}

impl CredentialStore {
    /// Create a signed-out store persisting through `cache`.
    pub fn new(cache: Arc<dyn CredentialCache>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            state: Mutex::new(SessionState::new()),
            cache,
            current,
        }
    }

    /// Load the cached credential at startup.
    ///
    /// Does nothing if a session is already live. Unreadable or incomplete
    /// records are ignored.
    pub async fn restore(&self) -> Option<Credential> {
        let record = match self.cache.load().await {
            Ok(record) => record?,
            Err(e) => {
                tracing::warn!("failed to read credential cache: {}", e);
                return None;
            }
        };
        let Some(credential) = record.into_credential() else {
            tracing::warn!("ignoring incomplete cached credential");
            return None;
        };
        self.apply(SessionEvent::Restored(credential)).await;
        self.get()
    }

    /// Store a new credential, persist it and notify subscribers.
    pub async fn set(&self, credential: Credential) -> Vec<SessionAction> {
        self.apply(SessionEvent::SignedIn(credential)).await
    }

    /// Replace the profile of the signed-in user.
    pub async fn update_profile(&self, profile: Profile) -> Vec<SessionAction> {
        self.apply(SessionEvent::ProfileUpdated(profile)).await
    }

    /// Wipe the credential after an explicit logout.
    pub async fn clear(&self) -> Vec<SessionAction> {
        self.apply(SessionEvent::SignedOut).await
    }

    /// Wipe the credential after the account was deleted.
    pub async fn account_deleted(&self) -> Vec<SessionAction> {
        self.apply(SessionEvent::AccountDeleted).await
    }

    /// The current credential, if any.
    pub fn get(&self) -> Option<Credential> {
        self.current.borrow().clone()
    }

    /// Current session epoch.
    pub async fn epoch(&self) -> Epoch {
        self.state.lock().await.epoch()
    }

    /// The current credential together with the epoch it belongs to.
    pub async fn session(&self) -> (Option<Credential>, Epoch) {
        let state = self.state.lock().await;
        (state.credential().cloned(), state.epoch())
    }

    /// Watch credential changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.current.subscribe()
    }

    async fn apply(&self, event: SessionEvent) -> Vec<SessionAction> {
        let mut state = self.state.lock().await;
        let (next, actions) = state.clone().on_event(event);
        *state = next;

        let mut deferred = Vec::new();
        for action in actions {
            match action {
                SessionAction::PersistCredential => {
                    if let Some(credential) = state.credential() {
                        if let Err(e) = self.cache.save(&credential.to_record()).await {
                            tracing::warn!("failed to persist credential: {}", e);
                        }
                    }
                }
                SessionAction::ClearCache => {
                    if let Err(e) = self.cache.clear().await {
                        tracing::warn!("failed to clear credential cache: {}", e);
                    }
                }
                SessionAction::Notify => {
                    self.current.send_replace(state.credential().cloned());
                    tracing::debug!("session epoch now {}", state.epoch().value());
                }
                other => deferred.push(other),
            }
        }
        deferred
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("signed_in", &self.current.borrow().is_some())
            .finish_non_exhaustive()
    }
}
