//! Sync error taxonomy

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the store client, locator and orchestrator
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store rejected the credential. Never retried.
    #[error("Invalid credential: the remote store rejected the access token")]
    InvalidCredential,

    /// Request budget exhausted; refused locally without a network call
    #[error("Rate limited by the remote store{}", describe_reset(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Document does not exist (HTTP 404)
    #[error("Remote document '{id}' not found")]
    NotFound { id: String },

    /// Document was modified concurrently (HTTP 409)
    #[error("Remote document '{id}' was modified concurrently")]
    Conflict { id: String },

    /// Any other non-success response
    #[error("Remote store returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// Document content is not a progress snapshot
    #[error("Remote progress data is malformed: {0}")]
    MalformedRemoteData(String),

    /// Sync has not been set up on this device
    #[error("Sync is not enabled. Run `studysync setup` first.")]
    NotEnabled,

    /// Another sync is in flight
    #[error("A sync is already in progress")]
    Busy,

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API response body could not be decoded
    #[error("Failed to decode remote store response: {0}")]
    Json(#[from] serde_json::Error),

    /// Local persistence failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// Whether a failed write should trigger the one-shot relocate and retry
    pub fn is_write_recoverable(&self) -> bool {
        matches!(self, SyncError::NotFound { .. } | SyncError::Conflict { .. })
    }

    /// Errors that must never be retried automatically
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::InvalidCredential)
    }

    /// Reset time for rate-limit errors
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SyncError::RateLimited { reset_at } => *reset_at,
            _ => None,
        }
    }
}

fn describe_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(" until {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => String::new(),
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
