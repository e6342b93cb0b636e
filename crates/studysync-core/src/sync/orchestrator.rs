//! Sync orchestrator
//!
//! Owns the remote binding and runs the read-merge-write cycle. At most one
//! operation touches the remote at a time; a second automatic sync arriving
//! while one is in flight returns the caller's snapshot unchanged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::locator::DocumentLocator;
use crate::merge::merge;
use crate::rate_limit::RateLimitTracker;
use crate::remote::{Connector, DocumentLayout, GistConnector, RemoteStore};
use crate::snapshot::ProgressSnapshot;
use crate::storage::{keys, KeyValueStore};

use super::status::SyncStatus;

/// What the write retry does with the re-located document
#[derive(Debug, Clone, Copy)]
enum Retry {
    /// Merge with its content before writing
    Merge,
    /// Replace its content
    Overwrite,
}

/// Holds the in-flight flag for the lifetime of one operation
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinates local progress with the remote document
pub struct SyncOrchestrator {
    store: Arc<dyn KeyValueStore>,
    limiter: Arc<RateLimitTracker>,
    connector: Arc<dyn Connector>,
    layout: DocumentLayout,
    recheck_delay: Duration,
    remote: RwLock<Option<Arc<dyn RemoteStore>>>,
    in_progress: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator, reconnecting with a stored credential if any
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        limiter: Arc<RateLimitTracker>,
        connector: Arc<dyn Connector>,
        layout: DocumentLayout,
    ) -> Self {
        let remote = store
            .get(keys::CREDENTIAL)
            .filter(|credential| !credential.is_empty())
            .and_then(|credential| match connector.connect(&credential) {
                Ok(remote) => Some(remote),
                Err(e) => {
                    warn!("Stored credential could not be used: {}", e);
                    None
                }
            });

        let last_sync = store
            .get(keys::LAST_SYNC)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc));

        debug!(
            "Sync orchestrator ready (enabled: {}, last sync: {:?})",
            remote.is_some(),
            last_sync
        );

        Self {
            store,
            limiter,
            connector,
            layout,
            recheck_delay: Duration::ZERO,
            remote: RwLock::new(remote),
            in_progress: AtomicBool::new(false),
            last_sync: Mutex::new(last_sync),
        }
    }

    /// Wire up the gist backend from configuration
    pub fn from_config(config: &Config, store: Arc<dyn KeyValueStore>) -> Self {
        let limiter = Arc::new(RateLimitTracker::new(
            store.clone(),
            config.rate_limit_buffer(),
        ));
        let layout = config.document_layout();
        let connector = Arc::new(GistConnector::new(
            config.api_url.clone(),
            layout.clone(),
            limiter.clone(),
            config.request_timeout(),
        ));

        Self::new(store, limiter, connector, layout).with_recheck_delay(config.recheck_delay())
    }

    /// Pause before the locator's pre-create re-check
    pub fn with_recheck_delay(mut self, delay: Duration) -> Self {
        self.recheck_delay = delay;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.remote().is_some()
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            enabled: self.is_enabled(),
            last_sync: *self
                .last_sync
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            document_id: self
                .store
                .get(keys::DOCUMENT_ID)
                .filter(|id| !id.is_empty()),
            in_progress: self.in_progress.load(Ordering::Acquire),
            rate_limited_until: self.limiter.limited_until(),
        }
    }

    /// Validate a credential, bind the canonical document and enable sync
    ///
    /// Any failure leaves sync disabled with no credential stored.
    pub async fn setup(&self, credential: &str) -> SyncResult<String> {
        let credential = credential.trim();
        let Some(_flight) = InFlight::acquire(&self.in_progress) else {
            return Err(SyncError::Busy);
        };

        match self.bind(credential).await {
            Ok((remote, id)) => {
                *self.remote.write().unwrap_or_else(PoisonError::into_inner) = Some(remote);
                info!("Sync enabled with document {}", id);
                Ok(id)
            }
            Err(e) => {
                warn!("Sync setup failed: {}", e);
                if let Err(disable_err) = self.disable() {
                    warn!("Failed to reset sync state after setup failure: {}", disable_err);
                }
                Err(e)
            }
        }
    }

    async fn bind(&self, credential: &str) -> SyncResult<(Arc<dyn RemoteStore>, String)> {
        if credential.is_empty() {
            return Err(SyncError::InvalidCredential);
        }
        self.limiter.check()?;

        let remote = self.connector.connect(credential)?;
        if !remote.test_credential().await? {
            return Err(SyncError::InvalidCredential);
        }

        let id = self.locator(remote.as_ref()).ensure().await?;
        self.store.set(keys::CREDENTIAL, credential)?;

        Ok((remote, id))
    }

    /// Forget the credential and document binding
    ///
    /// Local progress is left untouched.
    pub fn disable(&self) -> SyncResult<()> {
        self.remote
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.store.remove(keys::CREDENTIAL)?;
        self.store.remove(keys::DOCUMENT_ID)?;
        info!("Sync disabled");
        Ok(())
    }

    /// Merge `local` with the remote document and write the result back
    ///
    /// Returns `local` unchanged when sync is disabled, rate limited or
    /// already running.
    pub async fn sync(&self, local: ProgressSnapshot) -> SyncResult<ProgressSnapshot> {
        let Some(remote) = self.remote() else {
            debug!("Sync disabled; keeping local progress");
            return Ok(local);
        };

        if let Some(until) = self.limiter.limited_until() {
            info!("Rate limited until {}; skipping sync", until);
            return Ok(local);
        }

        let Some(_flight) = InFlight::acquire(&self.in_progress) else {
            debug!("Sync already in progress; skipping");
            return Ok(local);
        };

        let located = self.locator(remote.as_ref()).locate().await?;
        let document = match located.document {
            Some(document) => document,
            None => remote.fetch_document(&located.id).await?,
        };
        let remote_snapshot = document.snapshot(&self.layout)?;

        let mut merged = merge(Some(&local), remote_snapshot.as_ref());
        let now = Utc::now();
        merged.touch(now);

        let written = self
            .write(remote.as_ref(), &located.id, &merged, Retry::Merge)
            .await?;
        self.record_sync(now);

        info!(
            "Synced {} completed items (local {}, remote {})",
            written.completed_count(),
            local.completed_count(),
            remote_snapshot.as_ref().map_or(0, |s| s.completed_count())
        );

        Ok(written)
    }

    /// Overwrite the remote document with `local`, skipping the merge
    pub async fn force_upload_local(
        &self,
        local: &ProgressSnapshot,
    ) -> SyncResult<ProgressSnapshot> {
        let remote = self.remote().ok_or(SyncError::NotEnabled)?;
        self.limiter.check()?;
        let _flight = InFlight::acquire(&self.in_progress).ok_or(SyncError::Busy)?;

        let id = self.locator(remote.as_ref()).ensure().await?;

        let mut uploaded = local.clone();
        let now = Utc::now();
        uploaded.touch(now);

        let uploaded = self
            .write(remote.as_ref(), &id, &uploaded, Retry::Overwrite)
            .await?;
        self.record_sync(now);
        info!("Uploaded {} completed items", uploaded.completed_count());

        Ok(uploaded)
    }

    /// Fetch the remote snapshot so the caller can replace local progress
    pub async fn force_download_remote(&self) -> SyncResult<ProgressSnapshot> {
        let remote = self.remote().ok_or(SyncError::NotEnabled)?;
        self.limiter.check()?;
        let _flight = InFlight::acquire(&self.in_progress).ok_or(SyncError::Busy)?;

        // Never create here: an empty new document would wipe local progress
        let located = self
            .locator(remote.as_ref())
            .find()
            .await?
            .ok_or_else(|| SyncError::NotFound {
                id: self.layout.description.clone(),
            })?;
        let document = match located.document {
            Some(document) => document,
            None => remote.fetch_document(&located.id).await?,
        };

        let snapshot = document.snapshot(&self.layout)?.ok_or_else(|| {
            SyncError::MalformedRemoteData(format!(
                "document {} has no progress snapshot",
                located.id
            ))
        })?;

        self.record_sync(Utc::now());
        info!("Downloaded {} completed items", snapshot.completed_count());

        Ok(snapshot)
    }

    /// Delete the bound remote document
    ///
    /// Returns false when there was nothing to delete. Sync stays enabled;
    /// the next sync creates a fresh document.
    pub async fn delete_remote_document(&self) -> SyncResult<bool> {
        let remote = self.remote().ok_or(SyncError::NotEnabled)?;
        self.limiter.check()?;
        let _flight = InFlight::acquire(&self.in_progress).ok_or(SyncError::Busy)?;

        let locator = self.locator(remote.as_ref());
        let Some(id) = locator.cached_id() else {
            debug!("No bound document to delete");
            return Ok(false);
        };

        let deleted = remote.delete_document(&id).await?;
        locator.forget()?;
        info!("Deleted remote document {} (existed: {})", id, deleted);

        Ok(deleted)
    }

    /// Write with one retry against a re-located document
    ///
    /// Returns what was finally written. With [`Retry::Merge`] the retry
    /// folds in whatever the re-located document holds, so progress stored
    /// there is never overwritten.
    async fn write(
        &self,
        remote: &dyn RemoteStore,
        id: &str,
        snapshot: &ProgressSnapshot,
        retry: Retry,
    ) -> SyncResult<ProgressSnapshot> {
        let content = snapshot.to_content()?;

        match remote.update_document(id, &content).await {
            Ok(_) => Ok(snapshot.clone()),
            Err(e) if e.is_write_recoverable() => {
                warn!("Write to {} failed ({}); re-locating and retrying", id, e);
                let locator = self.locator(remote);
                locator.forget()?;
                let located = locator.locate().await?;

                let retried = match retry {
                    Retry::Overwrite => snapshot.clone(),
                    Retry::Merge => {
                        let document = match located.document {
                            Some(document) => document,
                            None => remote.fetch_document(&located.id).await?,
                        };
                        let current = document.snapshot(&self.layout)?;
                        let mut rebased = merge(Some(snapshot), current.as_ref());
                        rebased.touch(Utc::now());
                        rebased
                    }
                };

                remote
                    .update_document(&located.id, &retried.to_content()?)
                    .await?;
                Ok(retried)
            }
            Err(e) => Err(e),
        }
    }

    fn locator<'a>(&'a self, remote: &'a dyn RemoteStore) -> DocumentLocator<'a> {
        DocumentLocator::new(remote, self.store.as_ref(), &self.layout)
            .with_recheck_delay(self.recheck_delay)
    }

    fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_sync(&self, at: DateTime<Utc>) {
        *self
            .last_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
        if let Err(e) = self.store.set(keys::LAST_SYNC, &at.to_rfc3339()) {
            warn!("Failed to persist last sync time: {}", e);
        }
    }
}
