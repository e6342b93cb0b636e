//! Command handlers

use studysync_core::SyncError;

pub mod config;
pub mod progress;
pub mod remote;
pub mod setup;
pub mod status;
pub mod sync;

/// How times are shown to the user
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Wrap a sync error with what failed and, when known, what to do about it
pub fn explain(err: SyncError, action: &str) -> anyhow::Error {
    let hint = if err.is_fatal() {
        Some("Run `studysync setup` with a new token.".to_string())
    } else if let Some(at) = err.reset_at() {
        Some(format!("Try again after {}.", at.format(TIME_FORMAT)))
    } else if let SyncError::Storage(e) = &err {
        e.recovery_suggestion().map(str::to_string)
    } else {
        None
    };

    let context = match hint {
        Some(hint) => format!("{}. {}", action, hint),
        None => action.to_string(),
    };
    anyhow::Error::new(err).context(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io;
    use std::path::PathBuf;
    use studysync_core::StorageError;

    #[test]
    fn test_explain_invalid_credential_points_to_setup() {
        let err = explain(SyncError::InvalidCredential, "Sync failed");

        assert_eq!(
            err.to_string(),
            "Sync failed. Run `studysync setup` with a new token."
        );
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::InvalidCredential)
        ));
    }

    #[test]
    fn test_explain_rate_limit_names_reset_time() {
        let reset_at = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let err = explain(
            SyncError::RateLimited {
                reset_at: Some(reset_at),
            },
            "Upload failed",
        );

        assert_eq!(
            err.to_string(),
            "Upload failed. Try again after 2025-01-05 12:00:00 UTC."
        );
    }

    #[test]
    fn test_explain_storage_uses_recovery_suggestion() {
        let storage = StorageError::DiskFull {
            path: PathBuf::from("/data/state.json"),
            source: io::Error::other("no space left on device"),
        };
        let err = explain(SyncError::Storage(storage), "Sync failed");

        assert!(err.to_string().contains("Free up disk space"));
        assert!(format!("{:#}", err).contains("/data/state.json"));
    }

    #[test]
    fn test_explain_without_hint_keeps_cause() {
        let err = explain(SyncError::Busy, "Download failed");

        assert_eq!(err.to_string(), "Download failed");
        assert_eq!(
            format!("{:#}", err),
            "Download failed: A sync is already in progress"
        );
    }
}
