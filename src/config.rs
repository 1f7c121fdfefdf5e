//! # Runtime Configuration
//!
//! Layered configuration for the interpreter, loaded with the `config` crate:
//!
//! 1. compiled defaults
//! 2. an optional `saga.{toml,yaml,json}` in the config directory
//! 3. `SAGA_*` environment variables (`SAGA_MAX_STEPS_PER_RUN=500`)
//!
//! Later layers override earlier ones. The result is validated before it is
//! handed back.

use crate::constants::defaults;
use crate::error::{RuntimeError, RuntimeResult};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deployment environment, reported in logs
    pub environment: String,
    /// Advances allowed in one `run_until_idle`; guards against effect loops
    /// that never suspend
    pub max_steps_per_run: usize,
    /// Buffered events per monitor subscriber
    pub monitor_capacity: usize,
    /// Reclaimed tasks kept as tombstones for late JOINs and lookups; the
    /// oldest are evicted past this count
    pub tombstone_capacity: usize,
    /// Log every triggered and settled effect at debug level
    pub trace_effects: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: defaults::ENVIRONMENT.to_string(),
            max_steps_per_run: defaults::MAX_STEPS_PER_RUN,
            monitor_capacity: defaults::MONITOR_CAPACITY,
            tombstone_capacity: defaults::TOMBSTONE_CAPACITY,
            trace_effects: false,
        }
    }
}

impl RuntimeConfig {
    /// Load from `./config` and the process environment
    pub fn load() -> RuntimeResult<Self> {
        Self::load_from_directory(None)
    }

    /// Load from an explicit config directory and the process environment
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> RuntimeResult<Self> {
        let config_dir = config_dir.unwrap_or_else(default_config_directory);
        Self::build(&config_dir, None)
    }

    /// Layer the file in `config_dir` with `env`, or the process environment
    /// when `env` is `None`
    fn build(config_dir: &Path, env: Option<HashMap<String, String>>) -> RuntimeResult<Self> {
        let base = Self::default();
        let file = config_dir.join(defaults::CONFIG_FILE_STEM);

        let settings = Config::builder()
            .set_default("environment", base.environment)?
            .set_default("max_steps_per_run", base.max_steps_per_run as i64)?
            .set_default("monitor_capacity", base.monitor_capacity as i64)?
            .set_default("tombstone_capacity", base.tombstone_capacity as i64)?
            .set_default("trace_effects", base.trace_effects)?
            .add_source(File::with_name(&file.to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix(defaults::ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        debug!(
            config_dir = %config_dir.display(),
            environment = %config.environment,
            max_steps_per_run = config.max_steps_per_run,
            monitor_capacity = config.monitor_capacity,
            tombstone_capacity = config.tombstone_capacity,
            trace_effects = config.trace_effects,
            "Runtime configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.environment.trim().is_empty() {
            return Err(invalid("environment must not be empty"));
        }
        if self.max_steps_per_run == 0 {
            return Err(invalid("max_steps_per_run must be greater than 0"));
        }
        if self.monitor_capacity == 0 {
            return Err(invalid("monitor_capacity must be greater than 0"));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn invalid(message: &str) -> RuntimeError {
    RuntimeError::Configuration(ConfigError::Message(message.to_string()))
}

fn default_config_directory() -> PathBuf {
    std::env::current_dir()
        .map(|dir| dir.join("config"))
        .unwrap_or_else(|_| PathBuf::from("config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = RuntimeConfig::build(dir.path(), no_env()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("saga.toml"),
            "environment = \"production\"\nmax_steps_per_run = 250\ntrace_effects = true\n",
        )
        .unwrap();

        let config = RuntimeConfig::build(dir.path(), no_env()).unwrap();
        assert_eq!(config.environment, "production");
        assert_eq!(config.max_steps_per_run, 250);
        assert_eq!(config.monitor_capacity, defaults::MONITOR_CAPACITY);
        assert!(config.trace_effects);
        assert!(config.is_production());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("saga.yaml"), "max_steps_per_run: 250\n").unwrap();

        let env = HashMap::from([
            ("SAGA_MAX_STEPS_PER_RUN".to_string(), "75".to_string()),
            ("SAGA_MONITOR_CAPACITY".to_string(), "16".to_string()),
            ("SAGA_TOMBSTONE_CAPACITY".to_string(), "0".to_string()),
        ]);
        let config = RuntimeConfig::build(dir.path(), Some(env)).unwrap();
        assert_eq!(config.max_steps_per_run, 75);
        assert_eq!(config.monitor_capacity, 16);
        assert_eq!(config.tombstone_capacity, 0);
    }

    #[test]
    fn test_validation_rejects_zero_budget() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("saga.json"), r#"{"max_steps_per_run": 0}"#).unwrap();

        let err = RuntimeConfig::build(dir.path(), no_env()).unwrap_err();
        assert!(matches!(err, RuntimeError::Configuration(_)));
        assert!(err.to_string().contains("max_steps_per_run"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = RuntimeConfig {
            monitor_capacity: 0,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(RuntimeConfig::default().validate().is_ok());
    }
}
