//! Client for an Electrum-style indexer (newline-delimited JSON-RPC 2.0 over
//! TCP), used for address lookups and status reporting.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

mod client;
pub mod types;

pub use client::{ElectrumClient, Notification};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// `host:port` of the indexer
    pub address: String,
    pub timeout_secs: Option<u64>,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

#[derive(Debug, Error)]
pub enum ElectrumError {
    #[error("failed to connect: {0}")]
    Connect(std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out calling {0}")]
    Timeout(String),
    #[error("connection closed")]
    Closed,
    #[error("server error ({code}): {message}")]
    Server { code: i64, message: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
