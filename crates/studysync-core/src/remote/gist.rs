//! GitHub Gist backed document store
//!
//! ## Endpoints
//!
//! - `GET /user`: credential check
//! - `GET /gists/{id}`, `POST /gists`, `PATCH /gists/{id}`, `DELETE /gists/{id}`
//! - `GET /gists?per_page=100&page=N`: listing, paged
//!
//! Every request goes through the shared [`RateLimitTracker`]: refused
//! locally while limited, and every response is fed back to it before the
//! caller sees the result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Connector, DocumentLayout, DocumentSummary, RemoteDocument, RemoteStore};
use crate::error::{SyncError, SyncResult};
use crate::rate_limit::{RateLimitSignal, RateLimitTracker};

const USER_AGENT: &str = concat!("studysync/", env!("CARGO_PKG_VERSION"));
const ACCEPT_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

const PER_PAGE: usize = 100;
/// Upper bound on listing pages; each page costs one request
const MAX_LIST_PAGES: usize = 10;

/// Gist API client bound to one credential
pub struct GistClient {
    http: Client,
    base_url: String,
    token: String,
    layout: DocumentLayout,
    limiter: Arc<RateLimitTracker>,
}

impl GistClient {
    pub fn new(
        base_url: &str,
        token: &str,
        layout: DocumentLayout,
        limiter: Arc<RateLimitTracker>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            layout,
            limiter,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue a request and return the body of a successful response
    ///
    /// `id` names the document for not-found and conflict errors.
    async fn send(&self, request: RequestBuilder, id: &str) -> SyncResult<String> {
        self.limiter.check()?;

        let response = request
            .bearer_auth(&self.token)
            .header(ACCEPT, ACCEPT_JSON)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        let signal = RateLimitSignal::from_response(status, &headers, &body);
        self.limiter.observe(&signal);
        debug!(
            "Remote store responded {} (remaining budget: {:?})",
            status, signal.remaining
        );

        if status.is_success() {
            return Ok(body);
        }

        Err(self.error_for(status, body, id, &signal))
    }

    fn error_for(
        &self,
        status: StatusCode,
        body: String,
        id: &str,
        signal: &RateLimitSignal,
    ) -> SyncError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => SyncError::RateLimited {
                reset_at: self.limiter.reset_at(),
            },
            StatusCode::FORBIDDEN if signal.is_exhausted() => SyncError::RateLimited {
                reset_at: self.limiter.reset_at(),
            },
            StatusCode::UNAUTHORIZED => SyncError::InvalidCredential,
            StatusCode::NOT_FOUND => SyncError::NotFound { id: id.to_string() },
            StatusCode::CONFLICT => SyncError::Conflict { id: id.to_string() },
            _ => SyncError::Remote {
                status: status.as_u16(),
                body,
            },
        }
    }

    fn files_payload(&self, content: &str) -> BTreeMap<String, FilePayload> {
        BTreeMap::from([(
            self.layout.filename.clone(),
            FilePayload {
                content: content.to_string(),
            },
        )])
    }
}

#[async_trait]
impl RemoteStore for GistClient {
    async fn test_credential(&self) -> SyncResult<bool> {
        match self.send(self.http.get(self.url("/user")), "user").await {
            Ok(_) => Ok(true),
            Err(SyncError::InvalidCredential) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fetch_document(&self, id: &str) -> SyncResult<RemoteDocument> {
        debug!("Fetching gist {}", id);
        let body = self
            .send(self.http.get(self.url(&format!("/gists/{}", id))), id)
            .await?;
        let gist: GistResponse = serde_json::from_str(&body)?;
        Ok(gist.into())
    }

    async fn create_document(&self, content: &str) -> SyncResult<RemoteDocument> {
        debug!("Creating gist '{}'", self.layout.description);
        let payload = CreateGist {
            description: &self.layout.description,
            public: false,
            files: self.files_payload(content),
        };
        let body = self
            .send(self.http.post(self.url("/gists")).json(&payload), "new")
            .await?;
        let gist: GistResponse = serde_json::from_str(&body)?;
        Ok(gist.into())
    }

    async fn update_document(&self, id: &str, content: &str) -> SyncResult<RemoteDocument> {
        debug!("Updating gist {}", id);
        let payload = UpdateGist {
            description: &self.layout.description,
            files: self.files_payload(content),
        };
        let body = self
            .send(
                self.http
                    .patch(self.url(&format!("/gists/{}", id)))
                    .json(&payload),
                id,
            )
            .await?;
        let gist: GistResponse = serde_json::from_str(&body)?;
        Ok(gist.into())
    }

    async fn list_documents(&self) -> SyncResult<Vec<DocumentSummary>> {
        let mut summaries = Vec::new();

        for page in 1..=MAX_LIST_PAGES {
            let request = self
                .http
                .get(self.url("/gists"))
                .query(&[("per_page", PER_PAGE), ("page", page)]);
            let body = self.send(request, "gists").await?;
            let listing: Vec<GistResponse> = serde_json::from_str(&body)?;
            let count = listing.len();

            summaries.extend(listing.into_iter().map(DocumentSummary::from));
            if count < PER_PAGE {
                break;
            }
        }

        debug!("Listed {} gists", summaries.len());
        Ok(summaries)
    }

    async fn delete_document(&self, id: &str) -> SyncResult<bool> {
        debug!("Deleting gist {}", id);
        match self
            .send(self.http.delete(self.url(&format!("/gists/{}", id))), id)
            .await
        {
            Ok(_) => Ok(true),
            Err(SyncError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Builds [`GistClient`]s sharing one rate limit tracker
pub struct GistConnector {
    base_url: String,
    layout: DocumentLayout,
    limiter: Arc<RateLimitTracker>,
    timeout: Duration,
}

impl GistConnector {
    pub fn new(
        base_url: impl Into<String>,
        layout: DocumentLayout,
        limiter: Arc<RateLimitTracker>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            layout,
            limiter,
            timeout,
        }
    }
}

impl Connector for GistConnector {
    fn connect(&self, credential: &str) -> SyncResult<Arc<dyn RemoteStore>> {
        let client = GistClient::new(
            &self.base_url,
            credential,
            self.layout.clone(),
            self.limiter.clone(),
            self.timeout,
        )?;
        Ok(Arc::new(client))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct FilePayload {
    content: String,
}

#[derive(Debug, Serialize)]
struct CreateGist<'a> {
    description: &'a str,
    public: bool,
    files: BTreeMap<String, FilePayload>,
}

#[derive(Debug, Serialize)]
struct UpdateGist<'a> {
    description: &'a str,
    files: BTreeMap<String, FilePayload>,
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    files: BTreeMap<String, GistFile>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
}

impl From<GistResponse> for RemoteDocument {
    fn from(gist: GistResponse) -> Self {
        let files = gist
            .files
            .into_iter()
            .map(|(name, file)| {
                let content = if file.truncated { None } else { file.content };
                (name, content)
            })
            .collect();

        RemoteDocument {
            id: gist.id,
            description: gist.description,
            files,
            updated_at: gist.updated_at,
        }
    }
}

impl From<GistResponse> for DocumentSummary {
    fn from(gist: GistResponse) -> Self {
        DocumentSummary {
            id: gist.id,
            description: gist.description,
            filenames: gist.files.into_keys().collect(),
            created_at: gist.created_at,
        }
    }
}
