//! Setup and disable handlers

use anyhow::{bail, Result};

use studysync_core::SyncError;

use crate::app::App;
use crate::commands::explain;
use crate::commands::sync::sync_quiet;
use crate::output::Output;
use crate::prompt::read_line;

/// Environment variable consulted when --token is absent
const TOKEN_ENV: &str = "STUDYSYNC_TOKEN";

/// Validate a token, bind the remote document and run a first sync
pub async fn setup(app: &App, token: Option<String>, output: &Output) -> Result<()> {
    let token = match token.or_else(|| std::env::var(TOKEN_ENV).ok()) {
        Some(token) => token,
        None if output.should_prompt() => read_line("GitHub token (gist scope): ")?,
        None => bail!("No token given. Pass --token or set {}.", TOKEN_ENV),
    };

    output.message("Checking token...");
    let document_id = match app.orchestrator.setup(&token).await {
        Ok(id) => id,
        Err(SyncError::InvalidCredential) => {
            bail!("The token was rejected. Check that it is valid and has the gist scope.")
        }
        Err(e) => return Err(explain(e, "Sync setup failed")),
    };

    output.success(&format!("Sync enabled (document {})", document_id));

    // Setup already succeeded; a failed first sync is retried next time
    if let Err(e) = sync_quiet(app).await {
        output.warn(&format!("Initial sync failed: {:#}", e));
    }

    Ok(())
}

/// Turn sync off, keeping local progress
pub fn disable(app: &App, output: &Output) -> Result<()> {
    if !app.orchestrator.is_enabled() {
        output.message("Sync is already disabled.");
        return Ok(());
    }

    app.orchestrator
        .disable()
        .map_err(|e| explain(e, "Failed to disable sync"))?;
    output.success("Sync disabled; local progress kept");
    Ok(())
}
