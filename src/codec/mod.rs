//! Decoding of the raw chain data the node pushes over its event feed, plus
//! the address helpers used by the query command.

use thiserror::Error;

pub mod cashaddr;
pub mod flow;
pub mod header;
pub mod reader;
pub mod script;
pub mod token;
pub mod transaction;

pub use header::{block_hash, parse_block_header};
pub use transaction::{DecodedTransaction, compute_txid, decode_transaction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed block header: need 80 bytes, got {0}")]
    MalformedHeader(usize),
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("unsupported address type: {0}")]
    UnsupportedAddressType(String),
}

pub fn invalid_encoding<S: Into<String>>(msg: S) -> CodecError {
    CodecError::InvalidEncoding(msg.into())
}
