//! Status command handler

use anyhow::Result;

use crate::app::App;
use crate::commands::TIME_FORMAT;
use crate::output::{to_json, Output, OutputFormat};

/// Show sync and progress status
pub fn show(app: &App, output: &Output) -> Result<()> {
    let status = app.orchestrator.status();
    let progress = app.progress()?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                to_json(&serde_json::json!({
                    "sync": status,
                    "completed": progress.completed_count(),
                    "last_modified": progress.last_modified,
                    "data_dir": app.config.data_dir,
                }))
            );
        }
        OutputFormat::Quiet => {
            println!("{}", if status.enabled { "enabled" } else { "disabled" });
        }
        OutputFormat::Human => {
            println!("StudySync Status");
            println!("================");
            println!();
            println!("Sync:");
            println!(
                "  Status:    {}",
                if status.enabled { "enabled" } else { "disabled" }
            );
            if let Some(ref id) = status.document_id {
                println!("  Document:  {}", id);
            }
            println!(
                "  Last sync: {}",
                status
                    .last_sync
                    .map(|at| at.format(TIME_FORMAT).to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            if let Some(until) = status.rate_limited_until {
                println!("  Rate limited until {}", until.format(TIME_FORMAT));
            }
            if status.enabled {
                println!(
                    "  Ready:     {}",
                    if status.can_sync() { "yes" } else { "no" }
                );
            }
            println!();
            println!("Progress:");
            println!("  Completed: {}", progress.completed_count());
            println!("  Location:  {}", app.config.data_dir.display());
        }
    }

    Ok(())
}
