//! Configuration Loader
//!
//! Handles loading configuration and applying overrides with proper precedence.

use crate::settings::CatoConfig;
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Loads configuration from multiple sources with the following precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Host config (./cato.toml) - overrides defaults
/// 3. Environment variables (CATO_*) - overrides the file
/// 4. CLI flags - highest priority (handled by caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides (used by tests and `--no-env`)
    ignore_env: bool,
}

/// Loaded configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective settings after overrides
    pub settings: CatoConfig,

    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Create a loader that does not consult CATO_* variables
    pub fn without_env() -> Self {
        Self { ignore_env: true }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find cato.toml. When none exists the
    /// defaults are used.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (source, settings) = match find_config_file(start_dir) {
            Some(path) => {
                let settings = CatoConfig::load_from_file(&path)?;
                (Some(path), settings)
            }
            None => (None, CatoConfig::default()),
        };

        let settings = self.apply_env_overrides(settings)?;
        Ok(Config { settings, source })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let settings = CatoConfig::load_from_file(config_path)?;
        let settings = self.apply_env_overrides(settings)?;

        Ok(Config {
            settings,
            source: Some(config_path.to_path_buf()),
        })
    }

    /// Apply environment variable overrides
    ///
    /// Recognized variables: CATO_BIND, CATO_DATABASE, CATO_SCRIPT_PATH,
    /// CATO_TIMEOUT_MS, CATO_MAX_STEPS.
    fn apply_env_overrides(&self, mut config: CatoConfig) -> ConfigResult<CatoConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(bind) = env::var("CATO_BIND") {
            config.server.bind = bind;
        }

        if let Ok(database) = env::var("CATO_DATABASE") {
            config.storage.database = PathBuf::from(database);
        }

        if let Ok(script_path) = env::var("CATO_SCRIPT_PATH") {
            config.functions.script_path = script_path;
        }

        if let Ok(timeout) = env::var("CATO_TIMEOUT_MS") {
            config.limits.timeout_ms = parse_number("CATO_TIMEOUT_MS", &timeout)?;
        }

        if let Ok(steps) = env::var("CATO_MAX_STEPS") {
            config.limits.max_steps = parse_number("CATO_MAX_STEPS", &steps)?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Walk up from `start_dir` looking for cato.toml
fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

fn parse_number(var: &str, raw: &str) -> ConfigResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            field: var.to_string(),
            reason: format!("'{}' is not a non-negative integer", raw),
        })
}

impl Config {
    /// Check if the settings came from a cato.toml
    pub fn has_file(&self) -> bool {
        self.source.is_some()
    }

    /// Directory containing the config file, if any
    pub fn root(&self) -> Option<&Path> {
        self.source.as_deref().and_then(Path::parent)
    }
}
