use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bitcoin::{BlockHash, Txid};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use retry::Retryable;
use types::{
    BlockHeaderInfo, BlockInfo, BlockchainInfo, MempoolEntry, NetworkInfo, TxOutInfo,
    VerboseBlock,
};

pub mod breaker;
pub mod client;
pub mod retry;
pub mod types;

pub use client::RpcClient;

const DEFAULT_MAX_CONCURRENT: usize = 5;
const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 30;
const DEFAULT_QUICK_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STANDARD_TIMEOUT_SECS: u64 = 15;
const DEFAULT_HEAVY_TIMEOUT_SECS: u64 = 30;

/// Node returns this text, in the body or error message, when its RPC work
/// queue is saturated
pub const WORK_QUEUE_EXCEEDED: &str = "work queue depth exceeded";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    /// Max in-flight node requests
    pub max_concurrent: Option<usize>,
    /// Attempts per call, first try included
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    /// Consecutive overload signals before the breaker opens
    pub breaker_threshold: Option<u32>,
    pub breaker_cooldown_secs: Option<u64>,
    pub quick_timeout_secs: Option<u64>,
    pub standard_timeout_secs: Option<u64>,
    pub heavy_timeout_secs: Option<u64>,
}

impl Config {
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT).max(1)
    }

    pub fn retry_policy(&self) -> retry::RetryPolicy {
        retry::RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
            base_delay: Duration::from_millis(self.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS)),
            max_delay: Duration::from_millis(self.max_delay_ms.unwrap_or(DEFAULT_MAX_DELAY_MS)),
        }
    }

    pub fn breaker(&self) -> breaker::CircuitBreaker {
        breaker::CircuitBreaker::new(
            self.breaker_threshold.unwrap_or(DEFAULT_BREAKER_THRESHOLD).max(1),
            Duration::from_secs(
                self.breaker_cooldown_secs
                    .unwrap_or(DEFAULT_BREAKER_COOLDOWN_SECS),
            ),
        )
    }

    pub fn timeouts(&self) -> client::Timeouts {
        client::Timeouts {
            quick: Duration::from_secs(
                self.quick_timeout_secs
                    .unwrap_or(DEFAULT_QUICK_TIMEOUT_SECS),
            ),
            standard: Duration::from_secs(
                self.standard_timeout_secs
                    .unwrap_or(DEFAULT_STANDARD_TIMEOUT_SECS),
            ),
            heavy: Duration::from_secs(
                self.heavy_timeout_secs
                    .unwrap_or(DEFAULT_HEAVY_TIMEOUT_SECS),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("node rpc work queue exceeded")]
    Overloaded,
    #[error("circuit breaker open, node calls suspended")]
    CircuitOpen,
    #[error("http status {0}")]
    Http(u16),
    #[error("node error {code}: {message}")]
    Protocol { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl Retryable for RpcError {
    fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(_) | RpcError::Overloaded => true,
            RpcError::Http(status) => *status >= 500,
            RpcError::CircuitOpen | RpcError::Protocol { .. } | RpcError::Decode(_) => false,
        }
    }

    fn backoff_multiplier(&self) -> u32 {
        match self {
            RpcError::Overloaded => 2,
            _ => 1,
        }
    }
}

/// Node calls the pipeline depends on
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_block_count(&self) -> Result<u32, RpcError>;

    async fn get_block_hash(&self, height: u32) -> Result<BlockHash, RpcError>;

    /// Block with fully decoded transactions
    async fn get_block(&self, hash: &BlockHash) -> Result<VerboseBlock, RpcError>;

    /// Block with transaction ids only
    async fn get_block_info(&self, hash: &BlockHash) -> Result<BlockInfo, RpcError>;

    async fn get_block_header(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError>;

    /// Fully decoded transaction, kept as the node returned it
    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Value, RpcError>;

    /// Every mempool entry keyed by txid
    async fn get_raw_mempool(&self) -> Result<HashMap<String, MempoolEntry>, RpcError>;

    async fn get_mempool_entry(&self, txid: &Txid) -> Result<MempoolEntry, RpcError>;

    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError>;

    async fn get_network_info(&self) -> Result<NetworkInfo, RpcError>;

    async fn get_tx_out(
        &self,
        txid: &Txid,
        vout: u32,
        include_mempool: bool,
    ) -> Result<Option<TxOutInfo>, RpcError>;
}
