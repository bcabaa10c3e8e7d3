//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use cadence_core::Config;

use crate::output::{Output, OutputFormat};

/// Valid keys for `config set`
const KEYS: &str = "data_dir, remote_url, remote_api_key, remote_table, debounce_ms, \
                    max_retries, backoff_base_secs, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "owner_id": config.owner_id,
                    "remote_url": config.remote_url,
                    "remote_api_key": config.remote_api_key.as_ref().map(|_| "********"),
                    "remote_table": config.remote_table,
                    "debounce_ms": config.debounce_ms,
                    "max_retries": config.max_retries,
                    "backoff_base_secs": config.backoff_base_secs,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:          {}", config.data_dir.display());
            println!(
                "  owner_id:          {}",
                config
                    .owner_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!(
                "  remote_url:        {}",
                config.remote_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  remote_api_key:    {}",
                if config.remote_api_key.is_some() {
                    "********"
                } else {
                    "(not set)"
                }
            );
            println!("  remote_table:      {}", config.remote_table);
            println!("  debounce_ms:       {}", config.debounce_ms);
            println!("  max_retries:       {}", config.max_retries);
            println!("  backoff_base_secs: {}", config.backoff_base_secs);
            println!(
                "  log_file:          {}",
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
        .save_key(&save_path, &key)
        .context("Failed to save configuration")?;

    let shown = if key == "remote_api_key" {
        "********"
    } else {
        value.as_str()
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "remote_url" => config.remote_url = optional(value),
        "remote_api_key" => config.remote_api_key = optional(value),
        "remote_table" => {
            if value.is_empty() {
                bail!("remote_table cannot be empty");
            }
            config.remote_table = value.to_string();
        }
        "debounce_ms" => {
            config.debounce_ms = value
                .parse()
                .context("Invalid value for debounce_ms. Use milliseconds.")?;
        }
        "max_retries" => {
            config.max_retries = value
                .parse()
                .context("Invalid value for max_retries. Use a whole number.")?;
        }
        "backoff_base_secs" => {
            config.backoff_base_secs = value
                .parse()
                .context("Invalid value for backoff_base_secs. Use seconds.")?;
        }
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS
            );
        }
    }
    Ok(())
}
