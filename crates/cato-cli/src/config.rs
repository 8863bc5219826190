//! Effective settings for one `cato` command
//!
//! cato.toml (explicit or discovered) and `CATO_*` variables come from
//! `cato-config`; command-line flags are applied last.

use anyhow::{Context, Result};
use cato_config::{CatoConfig, ConfigLoader};
use std::path::{Path, PathBuf};

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub bind: Option<String>,
}

/// Load settings and apply `overrides`
///
/// A relative database path in cato.toml is taken relative to the file's
/// directory; one given on the command line stays relative to the working
/// directory.
pub fn load(explicit: Option<&Path>, overrides: Overrides) -> Result<CatoConfig> {
    let loader = ConfigLoader::new();
    let config = match explicit {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            loader.load_from_directory(&cwd)?
        }
    };
    if let Some(source) = &config.source {
        tracing::debug!(path = %source.display(), "loaded configuration");
    }

    let mut settings = config.settings;
    if let Some(root) = config.source.as_deref().and_then(Path::parent) {
        if settings.storage.database.is_relative() && std::env::var_os("CATO_DATABASE").is_none() {
            settings.storage.database = root.join(&settings.storage.database);
        }
    }
    apply(&mut settings, overrides);
    settings
        .validate()
        .context("Invalid command-line override")?;
    Ok(settings)
}

fn apply(settings: &mut CatoConfig, overrides: Overrides) {
    if let Some(database) = overrides.database {
        settings.storage.database = database;
    }
    if let Some(bind) = overrides.bind {
        settings.server.bind = bind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_database_relative_to_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cato.toml");
        fs::write(&path, "[storage]\ndatabase = \"data/cato.db\"\n").unwrap();

        let settings = load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(settings.storage.database, dir.path().join("data/cato.db"));
    }

    #[test]
    #[serial]
    fn test_flags_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cato.toml");
        fs::write(&path, "[server]\nbind = \"127.0.0.1:9000\"\n").unwrap();

        let overrides = Overrides {
            database: Some(PathBuf::from("other.db")),
            bind: Some("0.0.0.0:8081".to_string()),
        };
        let settings = load(Some(&path), overrides).unwrap();
        assert_eq!(settings.server.bind, "0.0.0.0:8081");
        assert_eq!(settings.storage.database, PathBuf::from("other.db"));
    }

    #[test]
    #[serial]
    fn test_bad_bind_flag_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cato.toml");
        fs::write(&path, "").unwrap();

        let overrides = Overrides {
            bind: Some("not an address".to_string()),
            ..Overrides::default()
        };
        assert!(load(Some(&path), overrides).is_err());
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let err = load(Some(&dir.path().join("absent.toml")), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
