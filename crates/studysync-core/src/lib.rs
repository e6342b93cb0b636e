//! StudySync Core Library
//!
//! This crate keeps a learner's study progress (the set of completed items
//! and when each was completed) in sync across devices, using a single
//! remote document in a GitHub Gist as the shared copy.
//!
//! # Architecture
//!
//! - **Snapshot**: the progress document, local and remote alike
//! - **Merge**: union of completed IDs, latest date wins per item
//! - **Locator**: finds or creates the one canonical remote document
//! - **Rate limit**: persisted gate that suppresses calls until reset
//! - **Orchestrator**: single-flight read-merge-write cycle
//!
//! # Quick Start
//!
//! ```text
//! let store = Arc::new(FileStore::open(config.state_path())?);
//! let orchestrator = SyncOrchestrator::from_config(&config, store);
//! orchestrator.setup(&token).await?;
//!
//! let merged = orchestrator.sync(local).await?;
//! ```
//!
//! # Modules
//!
//! - `sync`: Orchestrator and status (main entry point)
//! - `snapshot`: Progress snapshot and timestamp handling
//! - `merge`: Snapshot merge
//! - `locator`: Canonical document discovery
//! - `remote`: Remote store trait and the gist client
//! - `rate_limit`: Rate limit detection and gating
//! - `storage`: Local key-value persistence
//! - `config`: Application configuration

pub mod config;
pub mod error;
pub mod locator;
pub mod merge;
pub mod rate_limit;
pub mod remote;
pub mod snapshot;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{SyncError, SyncResult};
pub use merge::merge;
pub use rate_limit::RateLimitTracker;
pub use remote::{DocumentLayout, GistConnector, RemoteStore};
pub use snapshot::ProgressSnapshot;
pub use storage::{keys, FileStore, KeyValueStore, MemoryStore, StorageError};
pub use sync::{SyncOrchestrator, SyncStatus};
