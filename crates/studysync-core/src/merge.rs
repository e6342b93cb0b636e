//! Snapshot merge
//!
//! Reconciles the local and remote snapshots without any I/O:
//!
//! - completed IDs: set union
//! - completion dates: latest timestamp wins per item, starting from remote
//! - `last_modified`: the later of the two sides
//!
//! Either side may be absent, in which case the other is returned as is.

use crate::snapshot::{parse_timestamp, ProgressSnapshot};

/// Merge a local and a remote snapshot
pub fn merge(
    local: Option<&ProgressSnapshot>,
    remote: Option<&ProgressSnapshot>,
) -> ProgressSnapshot {
    let (local, remote) = match (local, remote) {
        (local, None) => return local.cloned().unwrap_or_default(),
        (None, Some(remote)) => return remote.clone(),
        (Some(local), Some(remote)) => (local, remote),
    };

    let completed_ids = remote
        .completed_ids
        .union(&local.completed_ids)
        .cloned()
        .collect();

    let mut completion_dates = remote.completion_dates.clone();
    for (id, local_date) in &local.completion_dates {
        let take_local = match completion_dates.get(id) {
            Some(existing) => is_strictly_later(local_date, existing),
            None => true,
        };
        if take_local {
            completion_dates.insert(id.clone(), local_date.clone());
        }
    }

    let last_modified = match (&local.last_modified, &remote.last_modified) {
        (Some(l), Some(r)) if is_strictly_later(l, r) => Some(l.clone()),
        (_, Some(r)) => Some(r.clone()),
        (l, None) => l.clone(),
    };

    ProgressSnapshot {
        completed_ids,
        completion_dates,
        last_modified,
    }
}

/// Chronological comparison; unparseable values never win
fn is_strictly_later(candidate: &str, existing: &str) -> bool {
    match (parse_timestamp(candidate), parse_timestamp(existing)) {
        (Some(candidate), Some(existing)) => candidate > existing,
        _ => false,
    }
}
