//! Configuration module
//!
//! Handles loading and managing runner configuration.

pub mod env;
pub mod file;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::SanitizerFlags;
use crate::results::ReportPolicy;
use crate::utils::LogLevel;

/// Application configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Maximum concurrent steps in one batch, 0 for unbounded
    pub max_concurrent: usize,

    /// Sanitizer defaults for root units
    pub sanitizers: SanitizerFlags,

    /// Fail the run when any nested unit fails
    pub fail_on_nested_failure: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            sanitizers: SanitizerFlags::all(),
            fail_on_nested_failure: false,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if file::is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if file::is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if LogLevel::from_str(&self.log_level).is_none() {
            let valid: Vec<&str> = LogLevel::all().iter().map(LogLevel::name).collect();
            anyhow::bail!(
                "Invalid log level '{}'. Valid values: {}",
                self.log_level,
                valid.join(", ")
            );
        }
        Ok(())
    }

    pub fn report_policy(&self) -> ReportPolicy {
        if self.fail_on_nested_failure {
            ReportPolicy::Strict
        } else {
            ReportPolicy::RootsOnly
        }
    }

    /// Parsed log level, `Info` if unrecognized
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_str(&self.log_level).unwrap_or_default()
    }
}
