//! Remote document store
//!
//! The remote side is a dumb blob store: it can fetch, create, update, list
//! and delete documents, but it offers no transactions and no merge. A
//! document holds one file whose content is the JSON-encoded
//! [`ProgressSnapshot`].
//!
//! [`RemoteStore`] is the seam between the sync engine and the network;
//! [`GistClient`] implements it against the GitHub Gist API.

mod gist;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};
use crate::snapshot::ProgressSnapshot;

pub use gist::{GistClient, GistConnector};

/// Default marker identifying this application's document
pub const DEFAULT_DESCRIPTION: &str = "StudySync progress";
/// Default name of the file holding the snapshot
pub const DEFAULT_FILENAME: &str = "progress.json";

/// Where the snapshot lives inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLayout {
    /// Application marker stored as the document description
    pub description: String,
    /// File holding the snapshot JSON
    pub filename: String,
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self {
            description: DEFAULT_DESCRIPTION.to_string(),
            filename: DEFAULT_FILENAME.to_string(),
        }
    }
}

impl DocumentLayout {
    /// Whether a listed document is one of ours
    pub fn matches(&self, summary: &DocumentSummary) -> bool {
        summary.description.as_deref() == Some(self.description.as_str())
            && summary.filenames.iter().any(|f| f == &self.filename)
    }
}

/// A fetched document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDocument {
    pub id: String,
    pub description: Option<String>,
    /// File name to content; `None` when the store truncated the content
    pub files: BTreeMap<String, Option<String>>,
    pub updated_at: Option<String>,
}

impl RemoteDocument {
    /// Decode the snapshot stored under the layout's file
    ///
    /// `Ok(None)` means the document holds an object without progress data.
    pub fn snapshot(&self, layout: &DocumentLayout) -> SyncResult<Option<ProgressSnapshot>> {
        match self.files.get(&layout.filename) {
            Some(Some(content)) => ProgressSnapshot::from_content(content),
            Some(None) => Err(SyncError::MalformedRemoteData(format!(
                "content of '{}' in document {} was truncated",
                layout.filename, self.id
            ))),
            None => Err(SyncError::MalformedRemoteData(format!(
                "document {} has no '{}' file",
                self.id, layout.filename
            ))),
        }
    }
}

/// A document as it appears in a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub description: Option<String>,
    pub filenames: Vec<String>,
    pub created_at: Option<String>,
}

/// Operations against the remote store
///
/// Implementations check the rate limit before every request and feed every
/// response to it. Non-success responses map to typed errors: 404 to
/// [`SyncError::NotFound`], 409 to [`SyncError::Conflict`], the rest to
/// [`SyncError::Remote`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Check the credential against a lightweight authenticated endpoint
    ///
    /// `Ok(false)` means the credential was rejected.
    async fn test_credential(&self) -> SyncResult<bool>;

    async fn fetch_document(&self, id: &str) -> SyncResult<RemoteDocument>;

    /// Create a new document holding `content`
    async fn create_document(&self, content: &str) -> SyncResult<RemoteDocument>;

    /// Replace the content of an existing document
    async fn update_document(&self, id: &str, content: &str) -> SyncResult<RemoteDocument>;

    /// Every document visible to the credential
    async fn list_documents(&self) -> SyncResult<Vec<DocumentSummary>>;

    /// Delete a document; `Ok(false)` if it was already gone
    async fn delete_document(&self, id: &str) -> SyncResult<bool>;
}

/// Builds a store client bound to a credential
pub trait Connector: Send + Sync {
    fn connect(&self, credential: &str) -> SyncResult<Arc<dyn RemoteStore>>;
}
