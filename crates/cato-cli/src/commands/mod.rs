pub mod check;
pub mod invoke;
pub mod kv;
pub mod project;
pub mod run;
pub mod serve;

use anyhow::{anyhow, Context, Result};
use cato_config::CatoConfig;
use cato_functions::{Invocation, ProjectRecord, ProjectStore, SqliteStore};
use std::sync::Arc;

/// Open the configured database
pub(crate) fn open_store(settings: &CatoConfig) -> Result<Arc<SqliteStore>> {
    let path = &settings.storage.database;
    let store = SqliteStore::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Look up a project by public id or fail with the not-found message
pub(crate) fn resolve(store: &SqliteStore, public_id: &str) -> Result<ProjectRecord> {
    store
        .resolve(public_id)?
        .ok_or_else(|| anyhow!("Project not found: {}", public_id))
}

/// Parse `--payload`; absent means an empty request
pub(crate) fn parse_payload(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    raw.map(|text| serde_json::from_str(text).context("--payload is not valid JSON"))
        .transpose()
}

pub(crate) fn print_invocation(invocation: &Invocation) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(invocation)?);
    Ok(())
}
