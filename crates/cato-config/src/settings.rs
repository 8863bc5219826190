//! Host Configuration (cato.toml)
//!
//! Every section is optional; missing sections and fields fall back to the
//! defaults documented on each field.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Host configuration from cato.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CatoConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Backing store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Function dispatch settings
    #[serde(default)]
    pub functions: FunctionsConfig,

    /// Per-invocation execution limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to listen on (default: "127.0.0.1:8080")
    pub bind: String,

    /// Maximum accepted request body in bytes (default: 64 KiB)
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Backing store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database file (default: "cato.db")
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cato.db"),
        }
    }
}

/// Function dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionsConfig {
    /// Project file holding the serverless script (default: "server.py")
    pub script_path: String,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            script_path: "server.py".to_string(),
        }
    }
}

/// Execution limits for a single script invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Wall-clock budget in milliseconds (default: 2000)
    pub timeout_ms: u64,

    /// Maximum interpreter steps (default: 1_000_000)
    pub max_steps: u64,

    /// Maximum nesting of script function calls (default: 100)
    pub max_call_depth: usize,

    /// Maximum captured print output in bytes (default: 64 KiB)
    pub max_output_bytes: usize,

    /// Maximum size of a single string or bytes value (default: 1 MiB)
    pub max_string_bytes: usize,

    /// Maximum length of a single list, tuple or dict (default: 100_000)
    pub max_collection_len: usize,

    /// Maximum script source size in bytes (default: 64 KiB)
    pub max_source_bytes: usize,

    /// Total bytes of strings and container slots a run may allocate,
    /// counted cumulatively (default: 128 MiB)
    pub max_memory_bytes: usize,

    /// Stack size of the script worker thread in KiB (default: 16 MiB)
    pub stack_size_kb: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            max_steps: 1_000_000,
            max_call_depth: 100,
            max_output_bytes: 64 * 1024,
            max_string_bytes: 1024 * 1024,
            max_collection_len: 100_000,
            max_source_bytes: 64 * 1024,
            max_memory_bytes: 128 * 1024 * 1024,
            stack_size_kb: 16 * 1024,
        }
    }
}

impl CatoConfig {
    /// Load host configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;

        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::from("<inline>"),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the host configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(invalid(
                "server.bind",
                format!("'{}' is not a socket address", self.server.bind),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes", "must be greater than zero"));
        }

        if self.storage.database.as_os_str().is_empty() {
            return Err(invalid("storage.database", "path cannot be empty"));
        }

        let script = self.functions.script_path.trim();
        if script.is_empty() {
            return Err(invalid("functions.script_path", "path cannot be empty"));
        }

        self.limits.validate()
    }
}

impl LimitsConfig {
    /// Validate limit values
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("limits.timeout_ms", self.timeout_ms == 0),
            ("limits.max_steps", self.max_steps == 0),
            ("limits.max_call_depth", self.max_call_depth == 0),
            ("limits.max_output_bytes", self.max_output_bytes == 0),
            ("limits.max_string_bytes", self.max_string_bytes == 0),
            ("limits.max_collection_len", self.max_collection_len == 0),
            ("limits.max_source_bytes", self.max_source_bytes == 0),
            ("limits.max_memory_bytes", self.max_memory_bytes == 0),
        ];
        for (field, is_zero) in positive {
            if is_zero {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        if self.max_call_depth > 1_000 {
            return Err(invalid("limits.max_call_depth", "cannot exceed 1000"));
        }
        if self.stack_size_kb < 256 {
            return Err(invalid("limits.stack_size_kb", "must be at least 256"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}
