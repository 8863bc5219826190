//! Run command - execute a script once against an in-memory store

use super::{parse_payload, print_invocation};
use anyhow::{Context, Result};
use cato_config::CatoConfig;
use cato_functions::{Dispatcher, DispatcherConfig, MemoryStore, ProjectStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Run `file` as a freshly deployed project and print the envelope
///
/// Nothing is written to the configured database.
pub fn run(file: &Path, payload: Option<&str>, settings: &CatoConfig) -> Result<()> {
    let source =
        fs::read(file).with_context(|| format!("Failed to read script: {}", file.display()))?;
    let payload = parse_payload(payload)?;

    let config = DispatcherConfig::from_config(settings);
    let store = Arc::new(MemoryStore::new());
    let project = store.create_project("local")?;
    store.put_file(&project, &config.script_path, &source)?;

    let dispatcher = Dispatcher::with_store(store, config);
    let invocation = dispatcher.invoke_blocking(project.public_id(), payload)?;
    print_invocation(&invocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_run_script() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "response = request.get('n', 0) + 1").unwrap();

        let result = run(file.path(), Some(r#"{"n": 1}"#), &CatoConfig::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_run_missing_file() {
        let result = run(Path::new("nonexistent.py"), None, &CatoConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_run_reports_script_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "response = 1 / 0").unwrap();

        let err = run(file.path(), None, &CatoConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero (line 1)");
    }
}
