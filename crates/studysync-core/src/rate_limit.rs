//! Rate limit tracking
//!
//! The remote store grants a fixed request budget per window. Once a
//! response says the budget is spent, every further remote call is refused
//! locally until the reset time passes, so a reload or retry loop can't burn
//! the next window too.
//!
//! ## States
//!
//! - **Open**: no reset time, or the reset time is in the past
//! - **Limited**: reset time in the future
//!
//! The reset time is persisted under [`keys::RATE_LIMIT_RESET`] and reloaded
//! at construction.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::storage::{keys, KeyValueStore};

/// Header carrying the remaining request budget
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Header carrying the budget reset time (epoch seconds)
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Default margin added to the server's reset time for clock skew
pub const DEFAULT_BUFFER: Duration = Duration::from_secs(30);

/// Rate-limit relevant facts extracted from one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub status: u16,
    pub remaining: Option<u64>,
    pub reset_epoch: Option<i64>,
    pub retry_after_secs: Option<u64>,
    pub mentions_rate_limit: bool,
}

impl RateLimitSignal {
    /// Extract the signal from a response's status, headers and body
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let header_num = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };
        let header_count = |name: &str| header_num(name).and_then(|v| u64::try_from(v).ok());

        Self {
            status: status.as_u16(),
            remaining: header_count(REMAINING_HEADER),
            reset_epoch: header_num(RESET_HEADER),
            retry_after_secs: header_count(RETRY_AFTER.as_str()),
            mentions_rate_limit: body.to_lowercase().contains("rate limit"),
        }
    }

    /// Whether this response says the budget is exhausted
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
            || self.status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            || (self.status == StatusCode::FORBIDDEN.as_u16() && self.mentions_rate_limit)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reset time announced by the server, if any
    pub fn reset_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(epoch) = self.reset_epoch {
            return DateTime::from_timestamp(epoch, 0);
        }
        let secs = i64::try_from(self.retry_after_secs?).ok()?;
        Some(now + chrono::Duration::seconds(secs))
    }
}

/// Persisted Open/Limited state machine
pub struct RateLimitTracker {
    store: Arc<dyn KeyValueStore>,
    buffer: chrono::Duration,
    reset_at: Mutex<Option<DateTime<Utc>>>,
}

impl RateLimitTracker {
    /// Create a tracker, restoring any persisted reset time
    pub fn new(store: Arc<dyn KeyValueStore>, buffer: Duration) -> Self {
        let reset_at = store
            .get(keys::RATE_LIMIT_RESET)
            .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => Some(at.with_timezone(&Utc)),
                Err(e) => {
                    warn!("Ignoring unreadable rate limit reset {:?}: {}", raw, e);
                    None
                }
            });

        if let Some(at) = reset_at {
            debug!("Restored rate limit reset time {}", at);
        }

        Self {
            store,
            buffer: chrono::Duration::from_std(buffer)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            reset_at: Mutex::new(reset_at),
        }
    }

    /// Recorded reset time, whether or not it has passed
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        *self.lock()
    }

    /// Reset time if currently limited
    pub fn limited_until(&self) -> Option<DateTime<Utc>> {
        self.reset_at().filter(|at| *at > Utc::now())
    }

    pub fn is_limited(&self) -> bool {
        self.is_limited_at(Utc::now())
    }

    pub fn is_limited_at(&self, now: DateTime<Utc>) -> bool {
        self.reset_at().is_some_and(|at| at > now)
    }

    /// Refuse with [`SyncError::RateLimited`] while limited
    pub fn check(&self) -> SyncResult<()> {
        match self.limited_until() {
            Some(at) => Err(SyncError::RateLimited { reset_at: Some(at) }),
            None => Ok(()),
        }
    }

    /// Feed one response through the state machine
    pub fn observe(&self, signal: &RateLimitSignal) {
        if signal.is_exhausted() {
            match signal.reset_time(Utc::now()) {
                Some(at) => self.record_limit(at + self.buffer),
                None => warn!(
                    "Rate limit exhausted (HTTP {}) without a reset time; keeping {:?}",
                    signal.status,
                    self.reset_at()
                ),
            }
        } else if signal.is_success() {
            self.clear();
        }
    }

    /// Enter Limited until `until`
    pub fn record_limit(&self, until: DateTime<Utc>) {
        *self.lock() = Some(until);
        info!("Rate limited until {}", until);
        if let Err(e) = self.store.set(keys::RATE_LIMIT_RESET, &until.to_rfc3339()) {
            warn!("Failed to persist rate limit reset time: {}", e);
        }
    }

    /// Return to Open
    pub fn clear(&self) {
        if self.lock().take().is_none() {
            return;
        }
        info!("Rate limit cleared");
        if let Err(e) = self.store.remove(keys::RATE_LIMIT_RESET) {
            warn!("Failed to clear persisted rate limit reset time: {}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.reset_at.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    fn tracker(store: &Arc<MemoryStore>) -> RateLimitTracker {
        RateLimitTracker::new(store.clone(), DEFAULT_BUFFER)
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_signal_from_headers() {
        let signal = RateLimitSignal::from_response(
            StatusCode::OK,
            &headers(&[(REMAINING_HEADER, "0"), (RESET_HEADER, "1736078400")]),
            "{}",
        );
        assert!(signal.is_exhausted());
        assert!(signal.is_success());
        assert_eq!(
            signal.reset_time(Utc::now()),
            Some(Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_signal_exhaustion_rules() {
        let ok = RateLimitSignal::from_response(
            StatusCode::OK,
            &headers(&[(REMAINING_HEADER, "4999")]),
            "",
        );
        assert!(!ok.is_exhausted());

        let too_many =
            RateLimitSignal::from_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), "");
        assert!(too_many.is_exhausted());

        let forbidden_rate = RateLimitSignal::from_response(
            StatusCode::FORBIDDEN,
            &HeaderMap::new(),
            r#"{"message":"API rate limit exceeded for user"}"#,
        );
        assert!(forbidden_rate.is_exhausted());

        let forbidden_other = RateLimitSignal::from_response(
            StatusCode::FORBIDDEN,
            &HeaderMap::new(),
            r#"{"message":"Resource not accessible by personal access token"}"#,
        );
        assert!(!forbidden_other.is_exhausted());
    }

    #[test]
    fn test_retry_after_fallback() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let signal = RateLimitSignal::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("retry-after", "60")]),
            "",
        );
        assert_eq!(
            signal.reset_time(now),
            Some(Utc.with_ymd_and_hms(2025, 1, 5, 12, 1, 0).unwrap())
        );
    }

    #[test]
    fn test_exhaustion_enters_limited_with_buffer() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let reset = Utc::now() + chrono::Duration::minutes(10);

        tracker.observe(&RateLimitSignal {
            status: 403,
            remaining: Some(0),
            reset_epoch: Some(reset.timestamp()),
            ..Default::default()
        });

        let recorded = tracker.reset_at().unwrap();
        assert_eq!(recorded.timestamp(), reset.timestamp() + 30);
        assert!(tracker.is_limited());
        assert!(matches!(
            tracker.check(),
            Err(SyncError::RateLimited { reset_at: Some(_) })
        ));
        assert!(store.get(keys::RATE_LIMIT_RESET).is_some());
    }

    #[test]
    fn test_success_clears_limit() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        tracker.record_limit(Utc::now() + chrono::Duration::minutes(5));

        tracker.observe(&RateLimitSignal {
            status: 200,
            remaining: Some(10),
            ..Default::default()
        });

        assert!(!tracker.is_limited());
        assert!(tracker.reset_at().is_none());
        assert!(store.get(keys::RATE_LIMIT_RESET).is_none());
    }

    #[test]
    fn test_failure_without_signal_leaves_limit() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let until = Utc::now() + chrono::Duration::minutes(5);
        tracker.record_limit(until);

        tracker.observe(&RateLimitSignal {
            status: 500,
            ..Default::default()
        });

        assert_eq!(tracker.reset_at(), Some(until));
    }

    #[test]
    fn test_exhaustion_without_reset_keeps_previous() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let until = Utc::now() + chrono::Duration::minutes(5);
        tracker.record_limit(until);

        tracker.observe(&RateLimitSignal {
            status: 429,
            ..Default::default()
        });

        assert_eq!(tracker.reset_at(), Some(until));
    }

    #[test]
    fn test_limit_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let until = Utc::now() + chrono::Duration::hours(1);
        tracker(&store).record_limit(until);

        let restored = tracker(&store);
        assert!(restored.is_limited());
        assert_eq!(
            restored.reset_at().map(|t| t.timestamp()),
            Some(until.timestamp())
        );
    }

    #[test]
    fn test_past_reset_is_open() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        tracker.record_limit(Utc::now() - chrono::Duration::seconds(1));

        assert!(!tracker.is_limited());
        assert!(tracker.check().is_ok());
        assert!(tracker.limited_until().is_none());
    }
}
