//! The JSON-RPC surface: a thin `jsonrpsee` routing layer over
//! [`fpd_app::FinalityProviderApp`]. Modeled on a daemon's
//! `bin/strata/src/rpc` module: build a server, merge the one `#[rpc]`
//! trait's module in, and run it until shutdown.

mod api;
mod errors;
mod server;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use fpd_app::FinalityProviderApp;
use fpd_tasks::TaskExecutor;
use jsonrpsee::server::ServerBuilder;
use tracing::info;

pub use api::{
    FinalityProviderRpcServer, FinalitySignatureResponse, InfoResponse, ProviderRecordView, TxResponseView,
};
pub use server::FinalityProviderRpcImpl;

/// Spawns the RPC server as a critical task on `executor`: an unexpected
/// exit (the listener dying) is fatal for the daemon, the same way a
/// stalled block poller would be.
pub fn start_rpc(executor: &TaskExecutor, bind_addr: String, app: Arc<FinalityProviderApp>) {
    executor.spawn_critical_async("rpc-server", run_server(bind_addr, app));
}

async fn run_server(bind_addr: String, app: Arc<FinalityProviderApp>) -> Result<()> {
    let server = ServerBuilder::new()
        .build(&bind_addr)
        .await
        .map_err(|e| anyhow!("failed to bind RPC server on {bind_addr}: {e}"))?;

    let module = FinalityProviderRpcImpl::new(app).into_rpc();
    let handle = server.start(module);

    info!(%bind_addr, "RPC server listening");
    handle.stopped().await;
    Ok(())
}
