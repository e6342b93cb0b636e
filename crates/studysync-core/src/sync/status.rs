//! Sync status reported to callers

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Sync has been set up and is bound to a credential
    pub enabled: bool,
    /// Last successful sync, upload or download
    pub last_sync: Option<DateTime<Utc>>,
    /// Cached canonical document ID
    pub document_id: Option<String>,
    /// A sync is currently running
    pub in_progress: bool,
    /// Remote calls are refused until this time
    pub rate_limited_until: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// Whether manual sync actions can run right now
    pub fn can_sync(&self) -> bool {
        self.enabled && !self.in_progress && self.rate_limited_until.is_none()
    }
}
