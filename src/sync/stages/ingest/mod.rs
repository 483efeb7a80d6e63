use bitcoin::Txid;
use thiserror::Error;

use crate::{codec::CodecError, rpc::RpcError, storage::StoreError};

pub mod orchestrator;
pub mod reorg;
pub mod stage;

pub use orchestrator::{Orchestrator, Settings};
pub use stage::*;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no cached ancestor within {hops} hops")]
    ReorgSafetyLimitExceeded { hops: usize },
    #[error("walked back to the first block without finding a cached ancestor")]
    NoCommonAncestor,
    #[error("unreadable node detail for {txid}: {reason}")]
    InvalidDetail { txid: Txid, reason: String },
}
