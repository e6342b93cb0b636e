//! Sync command handlers

use anyhow::{bail, Result};

use crate::app::App;
use crate::commands::{explain, TIME_FORMAT};
use crate::output::Output;

fn require_enabled(app: &App) -> Result<()> {
    if !app.orchestrator.is_enabled() {
        bail!("Sync is not set up. Set it up with:\n  studysync setup --token <token>");
    }
    Ok(())
}

/// Merge local progress with the remote document
pub async fn sync(app: &App, output: &Output) -> Result<()> {
    let status = app.orchestrator.status();
    if !status.can_sync() {
        require_enabled(app)?;
        if let Some(until) = status.rate_limited_until {
            bail!(
                "Rate limited until {}. Try again after that.",
                until.format(TIME_FORMAT)
            );
        }
        bail!("Another sync is already running. Try again shortly.");
    }

    let local = app.progress()?;
    let before = local.completed_count();

    output.message("Syncing progress...");
    let merged = app
        .orchestrator
        .sync(local)
        .await
        .map_err(|e| explain(e, "Sync failed"))?;
    app.save_progress(&merged)?;

    let gained = merged.completed_count().saturating_sub(before);
    if gained > 0 {
        output.success(&format!(
            "Sync complete - {} item(s) from other devices",
            gained
        ));
    } else {
        output.success("Sync complete - already up to date");
    }
    output.message(&format!("  Completed: {}", merged.completed_count()));

    Ok(())
}

/// Sync quietly (for auto-sync) - no output on success
pub async fn sync_quiet(app: &App) -> Result<()> {
    let local = app.progress()?;
    let merged = app
        .orchestrator
        .sync(local)
        .await
        .map_err(|e| explain(e, "Sync failed"))?;
    app.save_progress(&merged)
}

/// Overwrite the remote document with local progress
pub async fn push(app: &App, output: &Output) -> Result<()> {
    require_enabled(app)?;
    let local = app.progress()?;

    let uploaded = app
        .orchestrator
        .force_upload_local(&local)
        .await
        .map_err(|e| explain(e, "Upload failed"))?;
    app.save_progress(&uploaded)?;

    output.success(&format!(
        "Uploaded {} completed item(s); remote progress replaced",
        uploaded.completed_count()
    ));
    Ok(())
}

/// Replace local progress with the remote document
pub async fn pull(app: &App, output: &Output) -> Result<()> {
    require_enabled(app)?;

    let remote = app
        .orchestrator
        .force_download_remote()
        .await
        .map_err(|e| explain(e, "Download failed"))?;
    app.save_progress(&remote)?;

    output.success(&format!(
        "Downloaded {} completed item(s); local progress replaced",
        remote.completed_count()
    ));
    Ok(())
}
