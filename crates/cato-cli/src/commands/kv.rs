//! Key-value commands - inspect and edit one project's entries

use super::{open_store, resolve};
use anyhow::{anyhow, Result};
use cato_config::CatoConfig;
use cato_functions::{KvStore, Namespace};

/// Print `key<TAB>value` per entry, sorted by key
pub fn list(public_id: &str, settings: &CatoConfig) -> Result<()> {
    let store = open_store(settings)?;
    let project = resolve(&store, public_id)?;
    for (key, value) in store.list(Namespace::from(&project))? {
        println!("{}\t{}", key, value);
    }
    Ok(())
}

pub fn get(public_id: &str, key: &str, settings: &CatoConfig) -> Result<()> {
    let store = open_store(settings)?;
    let project = resolve(&store, public_id)?;
    let value = store
        .get(Namespace::from(&project), key)?
        .ok_or_else(|| anyhow!("Key not found: {}", key))?;
    println!("{}", value);
    Ok(())
}

pub fn set(public_id: &str, key: &str, value: &str, settings: &CatoConfig) -> Result<()> {
    let store = open_store(settings)?;
    let project = resolve(&store, public_id)?;
    store.set(Namespace::from(&project), key, value)?;
    Ok(())
}

pub fn delete(public_id: &str, key: &str, settings: &CatoConfig) -> Result<()> {
    let store = open_store(settings)?;
    let project = resolve(&store, public_id)?;
    if !store.delete(Namespace::from(&project), key)? {
        return Err(anyhow!("Key not found: {}", key));
    }
    Ok(())
}
