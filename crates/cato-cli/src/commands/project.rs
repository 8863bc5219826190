//! Project commands - create, deploy, delete and list projects

use super::{open_store, resolve};
use anyhow::{anyhow, Context, Result};
use cato_config::CatoConfig;
use cato_functions::{ProjectRecord, ProjectStore, SqliteStore};
use cato_runtime::{Engine, ExecError};
use std::fs;
use std::path::Path;

/// Create a project, optionally deploying `script`, and print its public id
pub fn create(name: &str, script: Option<&Path>, settings: &CatoConfig) -> Result<()> {
    let source = script.map(read_script).transpose()?;
    let store = open_store(settings)?;
    let project = store.create_project(name)?;
    if let Some(source) = source {
        store.put_file(&project, &settings.functions.script_path, source.as_bytes())?;
    }
    println!("{}", project.public_id());
    Ok(())
}

/// Replace the project's script with `file`
pub fn deploy(public_id: &str, file: &Path, settings: &CatoConfig) -> Result<()> {
    let source = read_script(file)?;
    let store = open_store(settings)?;
    let project = resolve(&store, public_id)?;
    store.put_file(&project, &settings.functions.script_path, source.as_bytes())?;
    eprintln!(
        "Deployed {} to {} ({} bytes)",
        file.display(),
        project.name(),
        source.len()
    );
    Ok(())
}

pub fn delete(public_id: &str, settings: &CatoConfig) -> Result<()> {
    let store = open_store(settings)?;
    let project = resolve(&store, public_id)?;
    store.delete_project(&project)?;
    eprintln!("Deleted project {}", project.name());
    Ok(())
}

pub fn list(settings: &CatoConfig) -> Result<()> {
    let store = open_store(settings)?;
    for project in store.list_projects()? {
        println!("{}", format_row(&store, &project, settings)?);
    }
    Ok(())
}

fn format_row(store: &SqliteStore, project: &ProjectRecord, settings: &CatoConfig) -> Result<String> {
    let deployed = store
        .get_file(project, &settings.functions.script_path)?
        .is_some();
    Ok(format!(
        "{}\t{}\t{}",
        project.public_id(),
        project.name(),
        if deployed { "deployed" } else { "empty" }
    ))
}

/// Read a script and refuse one that does not compile
fn read_script(file: &Path) -> Result<String> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read script: {}", file.display()))?;
    match Engine::new().check(&source) {
        Ok(()) => Ok(source),
        Err(ExecError::Compile(diagnostics)) => {
            for diagnostic in &diagnostics {
                eprintln!("{}: {}", file.display(), diagnostic);
            }
            Err(anyhow!("Refusing to deploy {}: it does not compile", file.display()))
        }
        Err(other) => Err(other.into()),
    }
}
