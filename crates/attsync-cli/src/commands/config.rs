//! Config command - View and manage attsync configuration
//!
//! Provides the `attsync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Writes a default configuration file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use attsync_core::{config::Config, domain::DownloadMode};
use clap::Subcommand;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "storage.max_check_age_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("storage.enabled", "File sync for the personal library (true|false)"),
    ("storage.groups_enabled", "File sync for group libraries (true|false)"),
    ("storage.download_mode_personal", "on_sync|on_demand"),
    ("storage.download_mode_groups", "on_sync|on_demand"),
    ("storage.max_check_age_secs", "Re-check window for synced files"),
    ("paths.data_dir", "Directory holding storage/ and the database"),
    ("paths.temp_dir", "Directory where downloads are staged"),
    ("download.max_path_length", "Longest full path"),
    ("download.max_name_length", "Longest filename"),
    ("download.min_shortened_name_length", "Shortest acceptable shortened name"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.file", "Log file path, or 'none' for stderr"),
    ("logging.json", "JSON log lines (true|false)"),
];

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(config_path, format).await,
            ConfigCommand::Set { key, value } => {
                self.execute_set(config_path, key, value, format).await
            }
            ConfigCommand::Validate => self.execute_validate(config_path, format).await,
            ConfigCommand::Init { force } => self.execute_init(config_path, *force, format).await,
        }
    }

    async fn execute_show(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let config = super::load_config(config_path)?;

        info!(config_path = %config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    async fn execute_set(
        &self,
        config_path: &Path,
        key: &str,
        value: &str,
        format: OutputFormat,
    ) -> Result<()> {
        let json = format.is_json();
        let formatter = get_formatter(format);
        let mut config = super::load_config(config_path)?;

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if json {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (k, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {k:<38} {help}"));
                }
            }
            return Ok(());
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            if json {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": messages,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{}': {}", key, messages.join("; ")));
            }
            return Ok(());
        }

        config
            .save(config_path)
            .context("Failed to write configuration file")?;

        if json {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, value));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    async fn execute_validate(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let json = format.is_json();
        let formatter = get_formatter(format);

        if !config_path.exists() {
            if json {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.info(&format!(
                    "Configuration file not found at {}",
                    config_path.display()
                ));
                formatter.info("Using default configuration. Run 'attsync config init' to create one.");
            }
            return Ok(());
        }

        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if json {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {}", e)],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {}", e));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");

        let errors = config.validate();

        if json {
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

        Ok(())
    }

    async fn execute_init(&self, config_path: &Path, force: bool, format: OutputFormat) -> Result<()> {
        let json = format.is_json();
        let formatter = get_formatter(format);

        if config_path.exists() && !force {
            formatter.error(&format!(
                "{} already exists; use --force to overwrite",
                config_path.display()
            ));
            return Ok(());
        }

        Config::default()
            .save(config_path)
            .context("Failed to write configuration file")?;
        info!(config_path = %config_path.display(), "Default configuration written");

        if json {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Wrote {}", config_path.display()));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .with_context(|| format!("Expected true or false for {key}"))
}

fn parse_download_mode(value: &str) -> Result<DownloadMode> {
    value.parse::<DownloadMode>().map_err(anyhow::Error::from)
}

/// Apply a dot-notation key/value pair to a Config struct
///
/// `storage.protocol` is not settable here: switching backends must also
/// mark attachments for upload, which `attsync mode set` does.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- storage ---
        "storage.enabled" => config.storage.enabled = parse_bool(key, value)?,
        "storage.groups_enabled" => config.storage.groups_enabled = parse_bool(key, value)?,
        "storage.protocol" => {
            anyhow::bail!("use 'attsync mode set --protocol <webdav|zfs>' to switch storage mode");
        }
        "storage.download_mode_personal" => {
            config.storage.download_mode_personal = parse_download_mode(value)?;
        }
        "storage.download_mode_groups" => {
            config.storage.download_mode_groups = parse_download_mode(value)?;
        }
        "storage.max_check_age_secs" => {
            config.storage.max_check_age_secs = value
                .parse::<u64>()
                .context("Expected a positive integer for storage.max_check_age_secs")?;
        }

        // --- paths ---
        "paths.data_dir" => config.paths.data_dir = PathBuf::from(value),
        "paths.temp_dir" => config.paths.temp_dir = PathBuf::from(value),

        // --- download ---
        "download.max_path_length" => {
            config.download.max_path_length = value
                .parse::<usize>()
                .context("Expected a positive integer")?;
        }
        "download.max_name_length" => {
            config.download.max_name_length = value
                .parse::<usize>()
                .context("Expected a positive integer")?;
        }
        "download.min_shortened_name_length" => {
            config.download.min_shortened_name_length = value
                .parse::<usize>()
                .context("Expected a positive integer")?;
        }

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.file" => {
            config.logging.file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        "logging.json" => config.logging.json = parse_bool(key, value)?,

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_storage_enabled() {
        let mut config = Config::default();
        apply_config_value(&mut config, "storage.groups_enabled", "false").unwrap();
        assert!(!config.storage.groups_enabled);
    }

    #[test]
    fn test_apply_download_mode() {
        let mut config = Config::default();
        apply_config_value(&mut config, "storage.download_mode_groups", "on_demand").unwrap();
        assert_eq!(config.storage.download_mode_groups, DownloadMode::OnDemand);
    }

    #[test]
    fn test_apply_max_check_age() {
        let mut config = Config::default();
        apply_config_value(&mut config, "storage.max_check_age_secs", "600").unwrap();
        assert_eq!(config.storage.max_check_age_secs, 600);
    }

    #[test]
    fn test_apply_protocol_is_rejected() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "storage.protocol", "webdav").is_err());
    }

    #[test]
    fn test_apply_paths() {
        let mut config = Config::default();
        apply_config_value(&mut config, "paths.data_dir", "/srv/attsync").unwrap();
        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/attsync"));
        assert_eq!(
            config.paths.database_path(),
            PathBuf::from("/srv/attsync/attsync.db")
        );
    }

    #[test]
    fn test_apply_download_limits() {
        let mut config = Config::default();
        apply_config_value(&mut config, "download.max_name_length", "143").unwrap();
        apply_config_value(&mut config, "download.min_shortened_name_length", "20").unwrap();
        assert_eq!(config.download.max_name_length, 143);
        assert_eq!(config.download.min_shortened_name_length, 20);
    }

    #[test]
    fn test_apply_logging_file_none() {
        let mut config = Config::default();
        apply_config_value(&mut config, "logging.file", "/var/log/attsync.log").unwrap();
        assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/attsync.log")));
        apply_config_value(&mut config, "logging.file", "none").unwrap();
        assert_eq!(config.logging.file, None);
    }

    #[test]
    fn test_apply_invalid_values_fail() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "storage.enabled", "yes").is_err());
        assert!(apply_config_value(&mut config, "storage.max_check_age_secs", "-5").is_err());
        assert!(apply_config_value(&mut config, "storage.download_mode_personal", "later").is_err());
    }

    #[test]
    fn test_apply_unknown_key_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "unknown.key", "value").is_err());
    }

    #[tokio::test]
    async fn test_init_then_set_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        ConfigCommand::Init { force: false }
            .execute(&path, OutputFormat::Json)
            .await
            .unwrap();
        assert!(path.exists());

        ConfigCommand::Set {
            key: "logging.level".to_string(),
            value: "debug".to_string(),
        }
        .execute(&path, OutputFormat::Json)
        .await
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[tokio::test]
    async fn test_set_invalid_level_leaves_file_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        Config::default().save(&path).unwrap();

        ConfigCommand::Set {
            key: "logging.level".to_string(),
            value: "loud".to_string(),
        }
        .execute(&path, OutputFormat::Json)
        .await
        .unwrap();

        assert_eq!(Config::load(&path).unwrap().logging.level, "info");
    }
}
