//! Configuration loading and precedence tests

use cato_config::{CatoConfig, ConfigError, ConfigLoader, CONFIG_FILE_NAME};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join(CONFIG_FILE_NAME);
    fs::write(&config_path, content).unwrap();
    config_path
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
fn test_load_full_config() {
    let temp_dir = TempDir::new().unwrap();
    let content = r#"
[server]
bind = "0.0.0.0:9000"
max_body_bytes = 1024

[storage]
database = "/var/lib/cato/cato.db"

[functions]
script_path = "api.py"

[limits]
timeout_ms = 500
max_steps = 10000
max_call_depth = 20
max_output_bytes = 2048
max_string_bytes = 4096
max_collection_len = 500
max_source_bytes = 8192
max_memory_bytes = 1048576
stack_size_kb = 4096
"#;
    let path = create_config_file(temp_dir.path(), content);

    let config = ConfigLoader::without_env().load_from_file(&path).unwrap();
    let settings = config.settings;

    assert_eq!(settings.server.bind, "0.0.0.0:9000");
    assert_eq!(settings.server.max_body_bytes, 1024);
    assert_eq!(settings.storage.database, PathBuf::from("/var/lib/cato/cato.db"));
    assert_eq!(settings.functions.script_path, "api.py");
    assert_eq!(settings.limits.timeout_ms, 500);
    assert_eq!(settings.limits.max_steps, 10_000);
    assert_eq!(settings.limits.max_call_depth, 20);
    assert_eq!(settings.limits.max_memory_bytes, 1024 * 1024);
    assert_eq!(settings.limits.stack_size_kb, 4096);
}

#[test]
fn test_load_with_empty_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    let config = ConfigLoader::without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(config.has_file());
    assert_eq!(config.settings, CatoConfig::default());
}

#[test]
fn test_load_from_nested_subdirectory() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[server]\nbind = \"127.0.0.1:7000\"\n");

    let nested = temp_dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    let config = ConfigLoader::without_env()
        .load_from_directory(&nested)
        .unwrap();

    assert_eq!(config.settings.server.bind, "127.0.0.1:7000");
}

#[test]
fn test_missing_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let err = ConfigLoader::without_env().load_from_file(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(path) if path == missing));
}

#[test]
fn test_syntax_error_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[limits\n");

    let err = ConfigLoader::without_env().load_from_file(&path).unwrap_err();
    match err {
        ConfigError::TomlParseError { file, .. } => assert_eq!(file, path),
        other => panic!("expected parse error, got {other}"),
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

#[rstest]
#[case("[limits]\nmax_steps = 0\n", "limits.max_steps")]
#[case("[limits]\nmax_call_depth = 5000\n", "limits.max_call_depth")]
#[case("[limits]\nmax_memory_bytes = 0\n", "limits.max_memory_bytes")]
#[case("[limits]\nstack_size_kb = 16\n", "limits.stack_size_kb")]
#[case("[server]\nmax_body_bytes = 0\n", "server.max_body_bytes")]
#[case("[functions]\nscript_path = \"  \"\n", "functions.script_path")]
fn test_invalid_values(#[case] content: &str, #[case] expected_field: &str) {
    match CatoConfig::from_toml_str(content) {
        Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected_field),
        other => panic!("expected invalid value for {expected_field}, got {other:?}"),
    }
}

// ============================================================================
// Environment Override Tests
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_file_values() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        "[storage]\ndatabase = \"file.db\"\n[functions]\nscript_path = \"a.py\"\n",
    );

    env::set_var("CATO_DATABASE", "env.db");
    env::set_var("CATO_SCRIPT_PATH", "b.py");
    env::set_var("CATO_BIND", "127.0.0.1:9999");
    let config = ConfigLoader::new().load_from_directory(temp_dir.path());
    env::remove_var("CATO_DATABASE");
    env::remove_var("CATO_SCRIPT_PATH");
    env::remove_var("CATO_BIND");

    let settings = config.unwrap().settings;
    assert_eq!(settings.storage.database, PathBuf::from("env.db"));
    assert_eq!(settings.functions.script_path, "b.py");
    assert_eq!(settings.server.bind, "127.0.0.1:9999");
}

#[test]
#[serial]
fn test_env_override_is_validated() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("CATO_TIMEOUT_MS", "0");
    let result = ConfigLoader::new().load_from_directory(temp_dir.path());
    env::remove_var("CATO_TIMEOUT_MS");

    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { ref field, .. }) if field == "limits.timeout_ms"
    ));
}

#[test]
#[serial]
fn test_without_env_ignores_variables() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("CATO_MAX_STEPS", "42");
    let config = ConfigLoader::without_env().load_from_directory(temp_dir.path());
    env::remove_var("CATO_MAX_STEPS");

    assert_eq!(config.unwrap().settings.limits.max_steps, 1_000_000);
}
