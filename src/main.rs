use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use error::Error;
use rpc::{NodeRpc, RpcClient};
use shutdown::ShutdownManager;
use storage::ChainCache;
use sync::{bootstrap, pipeline};

mod codec;
mod electrum;
mod error;
mod query;
mod rpc;
mod serve;
mod shutdown;
mod storage;
mod sync;

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match Config::new(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_level());

    let result = match args.command {
        Command::Run(_) => run(config).await,
        Command::Query(query_args) => match query_args.string.parse::<query::Query>() {
            Ok(q) => query::run(&q, &config).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: Config) -> Result<(), Error> {
    info!("running cashfeed with config: {config:?}");

    let rpc: Arc<dyn NodeRpc> = Arc::new(RpcClient::new(&config.node, &config.rpc)?);

    let store = storage::connect(&config.cache).await?;
    let cache = ChainCache::new(store, &config.cache);

    let mut shutdown = ShutdownManager::new();

    let synced = shutdown
        .run_until_shutdown(bootstrap::initial_sync(
            &cache,
            rpc.as_ref(),
            config.ingest.sync_concurrency(),
        ))
        .await;

    let Some(report) = synced else {
        cache.close().await?;
        return Ok(());
    };

    report?;

    if let Some(serve_config) = &config.serve {
        let state = serve::AppState::new(cache.clone(), rpc.clone(), config.electrum.clone());
        let address = serve_config.address().to_string();

        tokio::spawn(async move {
            if let Err(e) = serve::run(state, &address).await {
                error!("status server stopped: {e}");
            }
        });
    }

    let daemon = pipeline::pipeline(&config.node, &config.ingest, cache.clone(), rpc);

    shutdown.run_pipeline(daemon).await;

    cache.close().await?;

    Ok(())
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync the cache and follow the node's event feed
    Run(Args),
    /// `cache`, `<txid>:<vout>` or a cash address
    Query(QueryArgs),
}

#[derive(Debug, clap::Args)]
pub struct Args {}

#[derive(Debug, clap::Args)]
pub struct QueryArgs {
    string: String,
}

#[derive(Debug, Parser)]
#[clap(name = "cashfeed")]
#[clap(bin_name = "cashfeed")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    config: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    pub log_level: Option<String>,
    #[serde(default)]
    pub node: sync::NodeConfig,
    #[serde(default)]
    pub rpc: rpc::Config,
    #[serde(default)]
    pub cache: storage::Config,
    #[serde(default)]
    pub ingest: sync::Config,
    pub electrum: Option<electrum::Config>,
    pub serve: Option<serve::ServerConfig>,
}

impl Config {
    pub fn new(config_path: &Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let mut s = config::Config::builder();

        s = s.add_source(config::File::with_name("cashfeed.toml").required(false));

        if let Some(explicit) = config_path.as_ref().and_then(|x| x.to_str()) {
            s = s.add_source(config::File::with_name(explicit).required(true));
        }

        s = s.add_source(
            config::Environment::with_prefix("CASHFEED")
                .prefix_separator("_")
                .separator("__"),
        );

        s.build()?.try_deserialize()
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn explicit_file_fills_sections_and_defaults_the_rest() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();

        writeln!(
            file,
            r#"
log_level = "debug"

[node]
rpc_url = "http://node:8332"
rpc_user = "explorer"
rpc_pass = "hunter2"

[cache]
url = "memory://"
max_blocks = 30

[ingest]
revert_orphaned_txs = true

[electrum]
address = "127.0.0.1:50001"
"#
        )
        .unwrap();

        let config = Config::new(&Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.node.rpc_url(), "http://node:8332");
        assert_eq!(config.node.zmq_address(), "tcp://127.0.0.1:28332");
        assert_eq!(config.cache.max_blocks(), 30);
        assert_eq!(config.cache.max_transactions(), 20);
        assert!(config.ingest.revert_orphaned_txs());
        assert!(config.ingest.fill_gaps());
        assert_eq!(config.rpc.max_concurrent(), 5);
        assert_eq!(config.electrum.unwrap().address, "127.0.0.1:50001");
        assert!(config.serve.is_none());

        assert!(!format!("{:?}", config.node).contains("hunter2"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/cashfeed-test.toml");

        assert!(Config::new(&Some(path)).is_err());
    }
}
