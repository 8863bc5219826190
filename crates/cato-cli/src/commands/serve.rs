//! Serve command - HTTP function host

use super::open_store;
use anyhow::{Context, Result};
use cato_config::CatoConfig;
use cato_functions::http::{router, serve, shutdown_signal};
use cato_functions::{Dispatcher, DispatcherConfig};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Serve until Ctrl-C
pub fn run(settings: &CatoConfig) -> Result<()> {
    let addr: SocketAddr = settings
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", settings.server.bind))?;
    let store = open_store(settings)?;
    let dispatcher = Dispatcher::with_store(store, DispatcherConfig::from_config(settings));
    let app = router(dispatcher, settings.server.max_body_bytes);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!(
            database = %settings.storage.database.display(),
            script = %settings.functions.script_path,
            "cato function host started"
        );
        serve(listener, app, shutdown_signal()).await?;
        Ok(())
    })
}
