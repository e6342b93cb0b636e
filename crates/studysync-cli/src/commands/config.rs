//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use studysync_core::Config;

use crate::output::{to_json, Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!("{}", to_json(&config));
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:               {}", config.data_dir.display());
            println!("  api_url:                {}", config.api_url);
            println!("  document_description:   {}", config.document_description);
            println!("  document_filename:      {}", config.document_filename);
            println!("  rate_limit_buffer_secs: {}", config.rate_limit_buffer_secs);
            println!("  request_timeout_secs:   {}", config.request_timeout_secs);
            println!("  recheck_delay_ms:       {}", config.recheck_delay_ms);
            println!("  auto_sync:              {}", config.auto_sync);
            println!(
                "  log_file:               {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "api_url" => {
            if value.is_empty() {
                bail!("api_url cannot be empty");
            }
            config.api_url = value.trim_end_matches('/').to_string();
        }
        "document_description" => {
            if value.is_empty() {
                bail!("document_description cannot be empty");
            }
            config.document_description = value.to_string();
        }
        "document_filename" => {
            if value.is_empty() || value.contains('/') {
                bail!("document_filename must be a plain file name");
            }
            config.document_filename = value.to_string();
        }
        "rate_limit_buffer_secs" => {
            config.rate_limit_buffer_secs = parse_number(key, value)?;
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = parse_number(key, value)?;
        }
        "recheck_delay_ms" => {
            config.recheck_delay_ms = parse_number(key, value)?;
        }
        "auto_sync" => {
            config.auto_sync = value
                .parse()
                .context("Invalid value for auto_sync. Use 'true' or 'false'.")?;
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, api_url, document_description, document_filename, \
                 rate_limit_buffer_secs, request_timeout_secs, recheck_delay_ms, auto_sync, \
                 log_file",
                key
            );
        }
    }
    Ok(())
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("Invalid value for {}. Use a whole number.", key))
}
