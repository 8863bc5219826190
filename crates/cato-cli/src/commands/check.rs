//! Check command - compile a script without executing it

use anyhow::{anyhow, Context, Result};
use cato_runtime::{Engine, ExecError};
use std::fs;
use std::path::Path;

/// Report every diagnostic in `file`
pub fn run(file: &Path) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read script: {}", file.display()))?;

    match Engine::new().check(&source) {
        Ok(()) => {
            println!("{}: No errors found", file.display());
            Ok(())
        }
        Err(ExecError::Compile(diagnostics)) => {
            for diagnostic in &diagnostics {
                eprintln!("{}: {}", file.display(), diagnostic);
            }
            Err(anyhow!("{} has {} error(s)", file.display(), diagnostics.len()))
        }
        Err(other) => Err(other.into()),
    }
}
