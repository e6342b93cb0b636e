//! Local state for CLI commands
//!
//! The CLI owns the local copy of progress. It lives in the same key-value
//! file as the sync binding, under its own key.

use std::sync::Arc;

use anyhow::{Context, Result};

use studysync_core::snapshot::ProgressSnapshot;
use studysync_core::storage::{keys, FileStore, KeyValueStore};
use studysync_core::{Config, SyncOrchestrator};

use crate::commands::explain;

/// Opened state shared by every command
pub struct App {
    pub config: Config,
    pub orchestrator: SyncOrchestrator,
    store: Arc<FileStore>,
}

impl App {
    /// Open the state file under the configured data directory
    pub fn open(config: Config) -> Result<Self> {
        let path = config.state_path();
        let store = Arc::new(
            FileStore::open(&path).map_err(|e| {
                explain(e.into(), &format!("Failed to open state file {:?}", path))
            })?,
        );
        let orchestrator = SyncOrchestrator::from_config(&config, store.clone());

        Ok(Self {
            config,
            orchestrator,
            store,
        })
    }

    /// Local progress; empty when nothing has been saved yet
    pub fn progress(&self) -> Result<ProgressSnapshot> {
        match self.store.get(keys::PROGRESS) {
            Some(raw) => serde_json::from_str(&raw).context("Local progress is corrupt"),
            None => Ok(ProgressSnapshot::new()),
        }
    }

    /// Replace local progress
    pub fn save_progress(&self, progress: &ProgressSnapshot) -> Result<()> {
        let raw = serde_json::to_string(progress).context("Failed to encode progress")?;
        self.store
            .set(keys::PROGRESS, &raw)
            .map_err(|e| explain(e.into(), "Failed to save local progress"))?;
        Ok(())
    }
}
