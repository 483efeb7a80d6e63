use thiserror::Error;

use crate::{
    codec::CodecError, electrum::ElectrumError, rpc::RpcError, storage::StoreError,
    sync::stages::ingest::IngestError,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("node rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("cache store error: {0}")]
    Store(#[from] StoreError),

    #[error("electrum error: {0}")]
    Electrum(#[from] ElectrumError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
