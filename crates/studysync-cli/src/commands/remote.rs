//! Remote document handlers

use anyhow::{bail, Result};

use crate::app::App;
use crate::commands::explain;
use crate::output::Output;
use crate::prompt::confirm;

/// Delete the remote progress document
pub async fn delete(app: &App, yes: bool, output: &Output) -> Result<()> {
    if !app.orchestrator.is_enabled() {
        bail!("Sync is not set up; there is no remote document to delete.");
    }

    if !yes {
        if !output.should_prompt() {
            bail!("Refusing to delete the remote document without --yes");
        }
        println!("This deletes the progress document for every device using it.");
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let deleted = app
        .orchestrator
        .delete_remote_document()
        .await
        .map_err(|e| explain(e, "Failed to delete remote document"))?;

    if deleted {
        output.success("Remote document deleted; the next sync creates a new one");
    } else {
        output.message("No remote document to delete.");
    }
    Ok(())
}
