//! Configuration file discovery
//!
//! Finds the configuration file in the standard locations and layers
//! environment overrides on top.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::env::EnvConfig;
use super::AppConfig;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./stepwise.yaml",
    "./stepwise.yml",
    "./.stepwise.yaml",
    "~/.config/stepwise/config.yaml",
];

/// Find configuration file in standard locations
pub fn find() -> Option<PathBuf> {
    CONFIG_LOCATIONS
        .iter()
        .map(|location| expand_path(location))
        .find(|path| path.exists())
}

/// Load configuration: `explicit` path, then `STEPWISE_CONFIG`, then the
/// standard locations, then defaults. Environment overrides are applied last.
pub fn resolve(explicit: Option<&Path>) -> Result<AppConfig> {
    let env = EnvConfig::load();
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env.config_file.as_deref().map(expand_path))
        .or_else(find);

    let mut config = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            AppConfig::load(&path)?
        }
        None => {
            debug!("No config file found, using defaults");
            AppConfig::default()
        }
    };

    env.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::testing::{EnvBuilder, ENV_LOCK};
    use tempfile::tempdir;

    #[test]
    fn test_expand_path() {
        let path = expand_path("./test.yaml");
        assert_eq!(path, PathBuf::from("./test.yaml"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/x.yaml"), home.join("x.yaml"));
        }
    }

    #[test]
    fn test_is_yaml_file() {
        assert!(is_yaml_file(Path::new("stepwise.yaml")));
        assert!(is_yaml_file(Path::new("stepwise.yml")));
        assert!(!is_yaml_file(Path::new("stepwise.json")));
        assert!(!is_yaml_file(Path::new("stepwise")));
    }

    #[test]
    fn test_resolve_explicit_path_with_env_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stepwise.yaml");
        AppConfig {
            max_concurrent: 2,
            ..AppConfig::default()
        }
        .save(&path)
        .unwrap();

        let _guard = EnvBuilder::new().strict(true).apply_scoped();
        let config = resolve(Some(&path)).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert!(config.fail_on_nested_failure);
    }

    #[test]
    fn test_resolve_missing_explicit_path_fails() {
        let _lock = ENV_LOCK.lock();
        let dir = tempdir().unwrap();
        assert!(resolve(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}
