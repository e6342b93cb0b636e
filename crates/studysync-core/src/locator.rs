//! Document locator
//!
//! Finds the one remote document this device treats as canonical, creating
//! it if none exists, and heals after the cached document is deleted or
//! replaced.
//!
//! ## Algorithm
//!
//! 1. Cached ID: fetch it. Success is the fast path; any failure drops the
//!    cached ID.
//! 2. List documents and pick one carrying the app marker and snapshot file.
//! 3. None found: list once more right before creating, since another
//!    device may have just created one. Only then create a document seeded
//!    with an empty snapshot.
//!
//! A failed listing is propagated. Creating after a failed listing is how
//! duplicate documents appear in the first place.
//!
//! Two devices creating at the same instant can still both miss each other's
//! document. The store has no idempotency key to close that window; when
//! several matching documents exist, the oldest wins so devices converge.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::{DocumentLayout, DocumentSummary, RemoteDocument, RemoteStore};
use crate::snapshot::{parse_timestamp, ProgressSnapshot};
use crate::storage::{keys, KeyValueStore};

/// Result of locating the canonical document
#[derive(Debug, Clone)]
pub struct Located {
    pub id: String,
    /// The document, when locating already fetched or created it
    pub document: Option<RemoteDocument>,
}

/// Find-or-create for the canonical document
pub struct DocumentLocator<'a> {
    remote: &'a dyn RemoteStore,
    store: &'a dyn KeyValueStore,
    layout: &'a DocumentLayout,
    recheck_delay: Duration,
}

impl<'a> DocumentLocator<'a> {
    pub fn new(
        remote: &'a dyn RemoteStore,
        store: &'a dyn KeyValueStore,
        layout: &'a DocumentLayout,
    ) -> Self {
        Self {
            remote,
            store,
            layout,
            recheck_delay: Duration::ZERO,
        }
    }

    /// Wait this long before the pre-create re-check
    pub fn with_recheck_delay(mut self, delay: Duration) -> Self {
        self.recheck_delay = delay;
        self
    }

    /// Cached document ID, if any
    pub fn cached_id(&self) -> Option<String> {
        self.store.get(keys::DOCUMENT_ID).filter(|id| !id.is_empty())
    }

    /// Drop the cached document ID
    pub fn forget(&self) -> SyncResult<()> {
        self.store.remove(keys::DOCUMENT_ID)?;
        Ok(())
    }

    fn remember(&self, id: &str) -> SyncResult<()> {
        self.store.set(keys::DOCUMENT_ID, id)?;
        Ok(())
    }

    /// ID of the canonical document
    pub async fn ensure(&self) -> SyncResult<String> {
        Ok(self.locate().await?.id)
    }

    /// Existing canonical document, without ever creating one
    ///
    /// Runs the cached-ID fast path and a single scan.
    pub async fn find(&self) -> SyncResult<Option<Located>> {
        if let Some(id) = self.cached_id() {
            match self.remote.fetch_document(&id).await {
                Ok(document) => {
                    debug!("Cached document {} is valid", id);
                    return Ok(Some(Located {
                        id,
                        document: Some(document),
                    }));
                }
                // Refused locally, nothing learned about the document
                Err(e @ SyncError::RateLimited { .. }) => return Err(e),
                Err(e) => {
                    warn!("Cached document {} unusable ({}); searching", id, e);
                    self.forget()?;
                }
            }
        }

        if let Some(id) = self.find_existing().await? {
            info!("Found existing document {}", id);
            self.remember(&id)?;
            return Ok(Some(Located { id, document: None }));
        }

        Ok(None)
    }

    /// Canonical document, with its content when it was fetched on the way
    pub async fn locate(&self) -> SyncResult<Located> {
        if let Some(located) = self.find().await? {
            return Ok(located);
        }

        if !self.recheck_delay.is_zero() {
            tokio::time::sleep(self.recheck_delay).await;
        }

        if let Some(id) = self.find_existing().await? {
            info!("Document {} appeared before create; using it", id);
            self.remember(&id)?;
            return Ok(Located { id, document: None });
        }

        let seed = ProgressSnapshot::new().to_content()?;
        let document = self.remote.create_document(&seed).await?;
        info!("Created document {}", document.id);
        self.remember(&document.id)?;

        Ok(Located {
            id: document.id.clone(),
            document: Some(document),
        })
    }

    /// Oldest listed document matching the layout
    async fn find_existing(&self) -> SyncResult<Option<String>> {
        let mut matching: Vec<DocumentSummary> = self
            .remote
            .list_documents()
            .await?
            .into_iter()
            .filter(|summary| self.layout.matches(summary))
            .collect();

        if matching.len() > 1 {
            warn!(
                "{} documents carry the '{}' marker; using the oldest",
                matching.len(),
                self.layout.description
            );
        }

        matching.sort_by(|a, b| {
            creation_key(a)
                .cmp(&creation_key(b))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(matching.into_iter().next().map(|summary| summary.id))
    }
}

/// Documents without a readable creation time sort last
fn creation_key(summary: &DocumentSummary) -> (bool, Option<chrono::DateTime<chrono::Utc>>) {
    let created = summary.created_at.as_deref().and_then(parse_timestamp);
    (created.is_none(), created)
}
