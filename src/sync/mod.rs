use std::fmt;

use serde::Deserialize;

pub mod bootstrap;
pub mod miner;
pub mod pipeline;
pub mod stages;
pub mod summaries;

#[cfg(test)]
pub mod testing;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8332";
const DEFAULT_ZMQ_ADDRESS: &str = "tcp://127.0.0.1:28332";

const DEFAULT_MAX_REORG_DEPTH: usize = 100;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    /// Max in-flight notifications between the events and ingest stages
    pub stage_queue_size: Option<usize>,
    pub stage_timeout_secs: Option<u64>,

    /// Ancestor hops to walk looking for a cached block before giving up
    /// and clearing the block list
    pub max_reorg_depth: Option<usize>,
    /// Push the canonical blocks found while walking back from a fork
    pub fill_gaps: Option<bool>,
    /// Re-check transactions confirmed in orphaned blocks against the
    /// node's mempool
    pub revert_orphaned_txs: Option<bool>,
    /// Detect token outputs when falling back to the raw transaction bytes
    pub token_aware_fallback: Option<bool>,

    /// Parallel node fetches during the initial sync
    pub sync_concurrency: Option<usize>,
}

impl Config {
    pub fn max_reorg_depth(&self) -> usize {
        self.max_reorg_depth.unwrap_or(DEFAULT_MAX_REORG_DEPTH)
    }

    pub fn fill_gaps(&self) -> bool {
        self.fill_gaps.unwrap_or(true)
    }

    pub fn revert_orphaned_txs(&self) -> bool {
        self.revert_orphaned_txs.unwrap_or_default()
    }

    pub fn token_aware_fallback(&self) -> bool {
        self.token_aware_fallback.unwrap_or_default()
    }

    pub fn sync_concurrency(&self) -> usize {
        self.sync_concurrency
            .unwrap_or(bootstrap::DEFAULT_SYNC_CONCURRENCY)
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct NodeConfig {
    pub rpc_url: Option<String>,
    pub rpc_user: Option<String>,
    pub rpc_pass: Option<String>,
    pub zmq_address: Option<String>,
}

impl NodeConfig {
    pub fn rpc_url(&self) -> &str {
        self.rpc_url.as_deref().unwrap_or(DEFAULT_RPC_URL)
    }

    pub fn zmq_address(&self) -> &str {
        self.zmq_address.as_deref().unwrap_or(DEFAULT_ZMQ_ADDRESS)
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("rpc_url", &self.rpc_url())
            .field("rpc_user", &self.rpc_user)
            .field("rpc_pass", &self.rpc_pass.as_ref().map(|_| "<redacted>"))
            .field("zmq_address", &self.zmq_address())
            .finish()
    }
}
