use std::path::PathBuf;

use argh::FromArgs;

/// Finality provider daemon args.
#[derive(Debug, FromArgs, Clone)]
pub(crate) struct Args {
    /// path to the TOML config file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// path to the signer's root seed file
    #[argh(option, short = 'k')]
    pub seed_key: Option<PathBuf>,

    /// path to the finality provider store directory
    #[argh(option, short = 's')]
    pub store_path: Option<PathBuf>,

    /// JSON-RPC bind address, e.g. 127.0.0.1:8432
    #[argh(option, short = 'r')]
    pub rpc_addr: Option<String>,

    /// use JSON-formatted logs instead of compact
    #[argh(switch)]
    pub json_logs: bool,
}
