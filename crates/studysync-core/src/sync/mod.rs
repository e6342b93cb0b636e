//! Sync orchestration
//!
//! [`SyncOrchestrator`] is the entry point callers use: set up or disable
//! sync, reconcile the local snapshot with the remote document, or force
//! either side to win.
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = SyncOrchestrator::from_config(&config, store);
//! orchestrator.setup(&token).await?;
//! let merged = orchestrator.sync(local).await?;
//! ```

mod orchestrator;
mod status;

pub use orchestrator::SyncOrchestrator;
pub use status::SyncStatus;
