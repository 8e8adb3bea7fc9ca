//! Finality provider daemon.

mod args;
mod config;
mod errors;
mod helpers;

use std::sync::Arc;
use std::time::Duration;

use args::Args;
use config::Config;
use errors::{AppError, Result};
use fpd_app::{AppConfig, FinalityProviderApp};
use fpd_chain_client::{ChainClient, MockChainClient};
use fpd_common::logging;
use fpd_primitives::ChainId;
use fpd_signer::LocalEotsManager;
use fpd_store::{ProviderStore, SledStore};
use fpd_tasks::TaskManager;
use helpers::load_seed;
use tokio::runtime::{Builder, Handle};
use tracing::info;

const SHUTDOWN_TIMEOUT_MS: u64 = 5000;

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    main_inner(args)
}

fn main_inner(args: Args) -> Result<()> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("fpd-rt")
        .build()
        .expect("init: build rt");
    let handle = runtime.handle();

    let config = Config::from_args(&args).map_err(AppError::InvalidArgs)?;
    let _log_guard = init_logging(handle, &config);

    let network = config.bitcoin_network().map_err(AppError::InvalidArgs)?;
    let seed = load_seed(&config.seed_key)?;

    let task_manager = TaskManager::new(handle.clone());
    let executor = task_manager.create_executor();

    let chain: Arc<dyn ChainClient> = Arc::new(
        MockChainClient::new(config.chain.activation_height).with_finalization_lag(config.chain.finalization_lag),
    );
    let signer = Arc::new(
        LocalEotsManager::from_seed(&seed, network).map_err(|e| AppError::Other(e.into()))?,
    );
    let store: Arc<dyn ProviderStore> =
        Arc::new(SledStore::open(&config.store_path).map_err(|e| AppError::Other(e.into()))?);

    let app_config = AppConfig {
        chain_id: ChainId::from(config.chain_id.as_str()),
        poller: config.poller.clone(),
        instance: config.instance,
    };
    let app = Arc::new(FinalityProviderApp::new(
        chain,
        signer,
        store,
        executor.clone(),
        app_config,
    ));

    info!(rpc_addr = %config.rpc_addr, "starting finality provider daemon");
    handle
        .block_on(app.start_handling_all())
        .map_err(|e| AppError::Other(e.into()))?;

    fpd_rpc::start_rpc(&executor, config.rpc_addr.clone(), app);

    task_manager.start_signal_listeners();
    task_manager
        .monitor(Some(Duration::from_millis(SHUTDOWN_TIMEOUT_MS)))
        .map_err(AppError::Other)?;

    Ok(())
}

/// Sets up the logging system given a handle to a runtime context, mirroring
/// a daemon's `init_logging`/`logging::init_logging_from_config` split so
/// any non-blocking file writer is spawned against the running reactor.
fn init_logging(rt: &Handle, config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let _g = rt.enter();
    logging::init_logging("fpd", &config.logging)
}
