//! Invoke command - run a deployed project's function

use super::{open_store, parse_payload, print_invocation};
use anyhow::Result;
use cato_config::CatoConfig;
use cato_functions::{Dispatcher, DispatcherConfig};

pub fn run(public_id: &str, payload: Option<&str>, settings: &CatoConfig) -> Result<()> {
    let payload = parse_payload(payload)?;
    let store = open_store(settings)?;
    let dispatcher = Dispatcher::with_store(store, DispatcherConfig::from_config(settings));
    let invocation = dispatcher.invoke_blocking(public_id, payload)?;
    print_invocation(&invocation)
}
