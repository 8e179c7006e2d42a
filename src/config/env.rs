//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

use super::AppConfig;
use crate::models::SanitizerFlags;

/// Environment variable prefix
const ENV_PREFIX: &str = "STEPWISE";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Concurrency limit from STEPWISE_MAX_CONCURRENT
    pub max_concurrent: Option<usize>,
    /// Log level from STEPWISE_LOG_LEVEL
    pub log_level: Option<String>,
    /// Strict report policy from STEPWISE_STRICT
    pub strict: Option<bool>,
    /// Root sanitizers on or off from STEPWISE_SANITIZE
    pub sanitize: Option<bool>,
    /// Config file from STEPWISE_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            max_concurrent: get_env_parse("MAX_CONCURRENT"),
            log_level: get_env("LOG_LEVEL"),
            strict: get_env_bool("STRICT"),
            sanitize: get_env_bool("SANITIZE"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.max_concurrent.is_some()
            || self.log_level.is_some()
            || self.strict.is_some()
            || self.sanitize.is_some()
            || self.config_file.is_some()
    }

    /// Override `config` with every variable that is set
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent = max_concurrent;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(strict) = self.strict {
            config.fail_on_nested_failure = strict;
        }
        if let Some(sanitize) = self.sanitize {
            config.sanitizers = if sanitize {
                SanitizerFlags::all()
            } else {
                SanitizerFlags::none()
            };
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_MAX_CONCURRENT: {:?}", ENV_PREFIX, self.max_concurrent);
        println!("  {}_LOG_LEVEL:      {:?}", ENV_PREFIX, self.log_level);
        println!("  {}_STRICT:         {:?}", ENV_PREFIX, self.strict);
        println!("  {}_SANITIZE:       {:?}", ENV_PREFIX, self.sanitize);
        println!("  {}_CONFIG:         {:?}", ENV_PREFIX, self.config_file);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all STEPWISE environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_MAX_CONCURRENT  Concurrent step limit (0 = unbounded)");
    println!("  {ENV_PREFIX}_LOG_LEVEL       Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_STRICT          Fail the run on any nested failure (true/false)");
    println!("  {ENV_PREFIX}_SANITIZE        Root sanitizers on or off (true/false)");
    println!("  {ENV_PREFIX}_CONFIG          Path to configuration file");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_STRICT=true");
    println!("  stepwise run --sample all");
}

/// Scoped environment overrides for tests
#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::{const_mutex, Mutex, MutexGuard};
    use std::env;

    use super::ENV_PREFIX;

    /// Serializes tests that read or write the process environment
    pub(crate) static ENV_LOCK: Mutex<()> = const_mutex(());

    pub(crate) struct EnvBuilder {
        vars: Vec<(String, String)>,
    }

    impl EnvBuilder {
        pub(crate) fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn var(mut self, name: &str, value: String) -> Self {
            self.vars.push((format!("{ENV_PREFIX}_{name}"), value));
            self
        }

        pub(crate) fn max_concurrent(self, max_concurrent: usize) -> Self {
            self.var("MAX_CONCURRENT", max_concurrent.to_string())
        }

        pub(crate) fn log_level(self, level: &str) -> Self {
            self.var("LOG_LEVEL", level.to_string())
        }

        pub(crate) fn strict(self, strict: bool) -> Self {
            self.var("STRICT", strict.to_string())
        }

        pub(crate) fn sanitize(self, sanitize: bool) -> Self {
            self.var("SANITIZE", sanitize.to_string())
        }

        /// Set the variables until the guard drops. Holds [`ENV_LOCK`] meanwhile.
        pub(crate) fn apply_scoped(self) -> EnvGuard {
            let lock = ENV_LOCK.lock();
            let previous = self
                .vars
                .iter()
                .map(|(key, _)| (key.clone(), env::var(key).ok()))
                .collect();
            for (key, value) in self.vars {
                env::set_var(key, value);
            }
            EnvGuard {
                previous,
                _lock: lock,
            }
        }
    }

    /// Restores the previous values on drop
    pub(crate) struct EnvGuard {
        previous: Vec<(String, Option<String>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::EnvBuilder;
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.max_concurrent.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_builder() {
        let _guard = EnvBuilder::new()
            .max_concurrent(6)
            .log_level("debug")
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.max_concurrent, Some(6));
        assert_eq!(config.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = EnvBuilder::new().sanitize(false).apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.sanitize, Some(false));
    }

    #[test]
    fn test_apply_overrides() {
        let env = EnvConfig {
            max_concurrent: Some(1),
            strict: Some(true),
            sanitize: Some(false),
            ..Default::default()
        };
        let mut config = AppConfig::default();
        env.apply(&mut config);

        assert_eq!(config.max_concurrent, 1);
        assert!(config.fail_on_nested_failure);
        assert_eq!(config.sanitizers, SanitizerFlags::none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_scoped_overrides_are_restored() {
        {
            let _guard = EnvBuilder::new().strict(true).apply_scoped();
            assert_eq!(EnvConfig::load().strict, Some(true));
        }
        let _guard = EnvBuilder::new().apply_scoped();
        assert_eq!(EnvConfig::load().strict, None);
    }
}
