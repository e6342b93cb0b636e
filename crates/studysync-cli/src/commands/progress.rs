//! Progress command handlers

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use studysync_core::snapshot::parse_timestamp;

use crate::app::App;
use crate::output::Output;

/// Mark an item complete
///
/// Returns whether local progress changed.
pub fn complete(app: &App, id: String, at: Option<String>, output: &Output) -> Result<bool> {
    let id = id.trim().to_string();
    if id.is_empty() {
        bail!("Item ID cannot be empty");
    }

    let at = parse_at(at.as_deref())?;
    let mut progress = app.progress()?;

    if !progress.mark_complete(id.clone(), at) {
        output.message(&format!("Already completed: {}", id));
        return Ok(false);
    }

    progress.touch(Utc::now());
    app.save_progress(&progress)?;
    output.success(&format!("Completed: {}", id));
    Ok(true)
}

/// List completed items
pub fn list(app: &App, output: &Output) -> Result<()> {
    output.print_progress(&app.progress()?);
    Ok(())
}

fn parse_at(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        None => Ok(Utc::now()),
        Some(raw) => match parse_timestamp(raw) {
            Some(at) => Ok(at),
            None => bail!(
                "Invalid completion time '{}'. Use RFC 3339 or YYYY-MM-DD.",
                raw
            ),
        },
    }
}
