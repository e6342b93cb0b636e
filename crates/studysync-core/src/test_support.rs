//! Scripted in-memory remote store for tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};
use crate::remote::{
    Connector, DocumentLayout, DocumentSummary, RemoteDocument, RemoteStore,
};

/// Failure to inject into the next matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    Conflict,
    Status(u16),
    RateLimited,
}

impl Failure {
    fn into_error(self, id: &str) -> SyncError {
        match self {
            Failure::NotFound => SyncError::NotFound { id: id.to_string() },
            Failure::Conflict => SyncError::Conflict { id: id.to_string() },
            Failure::Status(status) => SyncError::Remote {
                status,
                body: "injected".to_string(),
            },
            Failure::RateLimited => SyncError::RateLimited { reset_at: None },
        }
    }
}

#[derive(Debug, Clone)]
struct FakeDoc {
    description: String,
    files: BTreeMap<String, String>,
    created_at: String,
}

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<String, FakeDoc>,
    next_id: u32,
    calls: Vec<String>,
    credential_valid: bool,
    fetch_failures: VecDeque<Failure>,
    update_failures: VecDeque<Failure>,
    /// Failures keyed by list call number (1-based)
    list_failures: Vec<(usize, Failure)>,
    /// Documents that appear right after the Nth list call (1-based)
    appear_after_list: Vec<(usize, String)>,
    list_count: usize,
    yield_on_fetch: bool,
}

/// In-memory document store that records every call
#[derive(Debug)]
pub struct FakeRemote {
    layout: DocumentLayout,
    state: Mutex<State>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            layout: DocumentLayout::default(),
            state: Mutex::new(State {
                credential_valid: true,
                ..State::default()
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn allocate(state: &mut State, description: &str, filename: &str, content: &str) -> String {
        state.next_id += 1;
        let id = format!("doc-{}", state.next_id);
        state.docs.insert(
            id.clone(),
            FakeDoc {
                description: description.to_string(),
                files: BTreeMap::from([(filename.to_string(), content.to_string())]),
                created_at: format!("2025-01-01T00:00:{:02}Z", state.next_id),
            },
        );
        id
    }

    /// Add a document with the app's layout holding `content`
    pub fn insert_progress(&self, content: &str) -> String {
        let mut state = self.state();
        Self::allocate(
            &mut state,
            &self.layout.description,
            &self.layout.filename,
            content,
        )
    }

    /// Add an unrelated document
    pub fn insert_other(&self, description: &str, filename: &str) -> String {
        let mut state = self.state();
        Self::allocate(&mut state, description, filename, "{}")
    }

    /// Make a matching document appear after the Nth list call
    pub fn create_concurrently_after_list(&self, nth: usize, content: &str) {
        self.state()
            .appear_after_list
            .push((nth, content.to_string()));
    }

    pub fn remove(&self, id: &str) {
        self.state().docs.remove(id);
    }

    pub fn content(&self, id: &str) -> Option<String> {
        self.state()
            .docs
            .get(id)
            .and_then(|d| d.files.get(&self.layout.filename).cloned())
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.state().docs.keys().cloned().collect()
    }

    pub fn set_credential_valid(&self, valid: bool) {
        self.state().credential_valid = valid;
    }

    pub fn fail_next_fetch(&self, failure: Failure) {
        self.state().fetch_failures.push_back(failure);
    }

    pub fn fail_next_update(&self, failure: Failure) {
        self.state().update_failures.push_back(failure);
    }

    pub fn fail_next_list(&self, failure: Failure) {
        let mut state = self.state();
        let next = state.list_count + 1;
        state.list_failures.push((next, failure));
    }

    /// Fail the Nth list call (1-based)
    pub fn fail_list_call(&self, nth: usize, failure: Failure) {
        self.state().list_failures.push((nth, failure));
    }

    /// Yield to the scheduler inside every fetch, so overlapping calls interleave
    pub fn yield_on_fetch(&self) {
        self.state().yield_on_fetch = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn to_document(id: &str, doc: &FakeDoc) -> RemoteDocument {
        RemoteDocument {
            id: id.to_string(),
            description: Some(doc.description.clone()),
            files: doc
                .files
                .iter()
                .map(|(k, v)| (k.clone(), Some(v.clone())))
                .collect(),
            updated_at: None,
        }
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn test_credential(&self) -> SyncResult<bool> {
        let mut state = self.state();
        state.calls.push("test_credential".to_string());
        Ok(state.credential_valid)
    }

    async fn fetch_document(&self, id: &str) -> SyncResult<RemoteDocument> {
        let should_yield = {
            let mut state = self.state();
            state.calls.push(format!("fetch {}", id));
            state.yield_on_fetch
        };
        if should_yield {
            tokio::task::yield_now().await;
        }

        let mut state = self.state();
        if let Some(failure) = state.fetch_failures.pop_front() {
            return Err(failure.into_error(id));
        }
        state
            .docs
            .get(id)
            .map(|doc| Self::to_document(id, doc))
            .ok_or_else(|| SyncError::NotFound { id: id.to_string() })
    }

    async fn create_document(&self, content: &str) -> SyncResult<RemoteDocument> {
        let mut state = self.state();
        state.calls.push("create".to_string());
        let id = Self::allocate(
            &mut state,
            &self.layout.description,
            &self.layout.filename,
            content,
        );
        let doc = state.docs[&id].clone();
        Ok(Self::to_document(&id, &doc))
    }

    async fn update_document(&self, id: &str, content: &str) -> SyncResult<RemoteDocument> {
        let mut state = self.state();
        state.calls.push(format!("update {}", id));
        if let Some(failure) = state.update_failures.pop_front() {
            return Err(failure.into_error(id));
        }
        let filename = self.layout.filename.clone();
        let doc = state
            .docs
            .get_mut(id)
            .ok_or_else(|| SyncError::NotFound { id: id.to_string() })?;
        doc.files.insert(filename, content.to_string());
        let doc = doc.clone();
        Ok(Self::to_document(id, &doc))
    }

    async fn list_documents(&self) -> SyncResult<Vec<DocumentSummary>> {
        let mut state = self.state();
        state.calls.push("list".to_string());
        state.list_count += 1;
        let current = state.list_count;
        if let Some(&(_, failure)) = state.list_failures.iter().find(|(nth, _)| *nth == current) {
            return Err(failure.into_error("gists"));
        }

        let summaries = state
            .docs
            .iter()
            .map(|(id, doc)| DocumentSummary {
                id: id.clone(),
                description: Some(doc.description.clone()),
                filenames: doc.files.keys().cloned().collect(),
                created_at: Some(doc.created_at.clone()),
            })
            .collect();

        let pending: Vec<String> = state
            .appear_after_list
            .iter()
            .filter(|(nth, _)| *nth == current)
            .map(|(_, content)| content.clone())
            .collect();
        for content in pending {
            let (description, filename) =
                (self.layout.description.clone(), self.layout.filename.clone());
            Self::allocate(&mut state, &description, &filename, &content);
        }

        Ok(summaries)
    }

    async fn delete_document(&self, id: &str) -> SyncResult<bool> {
        let mut state = self.state();
        state.calls.push(format!("delete {}", id));
        Ok(state.docs.remove(id).is_some())
    }
}

/// Connector handing out one shared fake, recording the credentials it saw
pub struct FakeConnector {
    pub remote: Arc<FakeRemote>,
    pub credentials: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(remote: Arc<FakeRemote>) -> Arc<Self> {
        Arc::new(Self {
            remote,
            credentials: Mutex::new(Vec::new()),
        })
    }
}

impl Connector for FakeConnector {
    fn connect(&self, credential: &str) -> SyncResult<Arc<dyn RemoteStore>> {
        self.credentials
            .lock()
            .unwrap()
            .push(credential.to_string());
        Ok(self.remote.clone())
    }
}
