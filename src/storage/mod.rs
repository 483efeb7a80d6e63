use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub mod cache;
pub mod memory_store;
pub mod model;
pub mod redis_store;
pub mod store;

pub use cache::ChainCache;
pub use store::CacheStore;

const DEFAULT_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_PREFIX: &str = "bch";
const DEFAULT_MAX_BLOCKS: usize = 15;
const DEFAULT_MAX_TRANSACTIONS: usize = 20;
const DEFAULT_DETAIL_TTL_SECS: u64 = 900;
const DEFAULT_MEMORY_MAX_ENTRIES: u64 = 10_000;

#[derive(Deserialize, Clone, Default)]
pub struct Config {
    /// `redis://host:port/db`, or `memory://` for the in-process store
    pub url: Option<String>,
    /// Namespace put in front of every key
    pub prefix: Option<String>,
    pub max_blocks: Option<usize>,
    pub max_transactions: Option<usize>,
    /// Lifetime of full transaction detail entries
    pub detail_ttl_secs: Option<u64>,
    /// Entry bound for the in-process detail cache
    pub memory_max_entries: Option<u64>,
}

impl Config {
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_URL)
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(DEFAULT_PREFIX)
    }

    pub fn max_blocks(&self) -> usize {
        self.max_blocks.unwrap_or(DEFAULT_MAX_BLOCKS).max(1)
    }

    pub fn max_transactions(&self) -> usize {
        self.max_transactions
            .unwrap_or(DEFAULT_MAX_TRANSACTIONS)
            .max(1)
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs.unwrap_or(DEFAULT_DETAIL_TTL_SECS))
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the url may embed a password
        let url = match self.url().split_once('@') {
            Some((_, host)) => format!("<redacted>@{host}"),
            None => self.url().to_string(),
        };

        f.debug_struct("Config")
            .field("url", &url)
            .field("prefix", &self.prefix())
            .field("max_blocks", &self.max_blocks())
            .field("max_transactions", &self.max_transactions())
            .field("detail_ttl", &self.detail_ttl())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported cache url: {0}")]
    UnsupportedUrl(String),
    #[error("{0}")]
    Command(String),
    #[error("cache store closed")]
    Closed,
}

/// Open the store the configured url points at
pub async fn connect(config: &Config) -> Result<Arc<dyn CacheStore>, StoreError> {
    let url = config.url();

    if url.starts_with("memory://") {
        info!("using in-process cache store");

        let max_entries = config
            .memory_max_entries
            .unwrap_or(DEFAULT_MEMORY_MAX_ENTRIES);

        return Ok(Arc::new(memory_store::MemoryStore::new(
            max_entries,
            config.detail_ttl(),
        )));
    }

    if url.starts_with("redis://") || url.starts_with("rediss://") {
        let store = redis_store::RedisStore::connect(url).await?;
        return Ok(Arc::new(store));
    }

    Err(StoreError::UnsupportedUrl(url.to_string()))
}
