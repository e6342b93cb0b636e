//! Progress snapshot model
//!
//! A snapshot is the whole synchronized state: the set of completed item IDs
//! plus a completion timestamp per item. It is the JSON payload stored in the
//! remote document and the local copy kept by the caller.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};

/// Completed items and their completion times
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Completed item identifiers
    #[serde(default)]
    pub completed_ids: BTreeSet<String>,
    /// Item identifier to ISO-8601 completion time
    #[serde(default)]
    pub completion_dates: BTreeMap<String, String>,
    /// Set by whoever last wrote the document. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl ProgressSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from completed IDs without dates
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            completed_ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Whether nothing has been completed
    pub fn is_empty(&self) -> bool {
        self.completed_ids.is_empty()
    }

    /// Number of completed items
    pub fn completed_count(&self) -> usize {
        self.completed_ids.len()
    }

    pub fn is_complete(&self, id: &str) -> bool {
        self.completed_ids.contains(id)
    }

    /// Mark an item complete at `at`
    ///
    /// Returns `false` if the item was already complete; its original date is kept.
    pub fn mark_complete(&mut self, id: impl Into<String>, at: DateTime<Utc>) -> bool {
        let id = id.into();
        if !self.completed_ids.insert(id.clone()) {
            return false;
        }
        self.completion_dates.insert(id, format_timestamp(at));
        true
    }

    /// Completion time for an item, if recorded and parseable
    pub fn completed_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.completion_dates
            .get(id)
            .and_then(|s| parse_timestamp(s))
    }

    /// Stamp `last_modified`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = Some(format_timestamp(now));
    }

    /// Parse document content
    ///
    /// Returns `Ok(None)` for a JSON object without `completedIds`, which the
    /// merge treats as an absent side. Anything that isn't a JSON object of
    /// the expected shape is an error, never an empty snapshot.
    pub fn from_content(content: &str) -> SyncResult<Option<Self>> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| SyncError::MalformedRemoteData(format!("invalid JSON: {}", e)))?;

        let Some(object) = value.as_object() else {
            return Err(SyncError::MalformedRemoteData(
                "expected a JSON object".to_string(),
            ));
        };

        if object.get("completedIds").map_or(true, Value::is_null) {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SyncError::MalformedRemoteData(e.to_string()))
    }

    /// Encode as document content
    pub fn to_content(&self) -> SyncResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Format a timestamp the way snapshots store them (RFC 3339, millis, `Z`)
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp
///
/// Accepts RFC 3339, a zone-less date-time (taken as UTC) and a plain
/// `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
