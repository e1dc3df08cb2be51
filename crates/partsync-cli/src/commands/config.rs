//! Config command - Inspect the partsync configuration
//!
//! Provides the `partsync config` CLI command which:
//! 1. Shows the effective configuration (file values plus flag overrides)
//! 2. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use partsync_core::config::Config;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(
        &self,
        config: &Config,
        config_path: &Path,
        format: OutputFormat,
    ) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config, config_path, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
        }
    }
}

fn execute_show(config: &Config, config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    info!(config_path = %config_path.display(), "Showing configuration");

    if matches!(format, OutputFormat::Json) {
        let json =
            serde_json::to_value(config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if !config_path.exists() {
        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "errors": [],
                "note": "configuration file not found; defaults apply",
            }));
        } else {
            formatter.info(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
            formatter.info("Defaults apply.");
        }
        return Ok(());
    }

    let config = Config::load(config_path)?;
    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if matches!(format, OutputFormat::Json) {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("invalid configuration in {}", config_path.display())
    }
}
