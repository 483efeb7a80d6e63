use bitcoin::{Amount, Txid};

use crate::{
    codec::{CodecError, DecodedTransaction},
    rpc::{
        RpcError,
        types::{BlockInfo, MempoolEntry, VerboseBlock, VerboseTransaction},
    },
    storage::model::{BlockSummary, TransactionSummary, TxStatus},
    sync::miner::extract_miner,
};

pub fn block_summary(block: &VerboseBlock) -> BlockSummary {
    BlockSummary {
        hash: block.hash,
        height: block.height,
        time: block.time,
        size: block.size,
        tx_count: block.tx.len() as u32,
        miner: block.coinbase().and_then(extract_miner),
    }
}

/// Summary of a block known only at verbosity 1; the miner is unknown
pub fn block_summary_from_info(info: &BlockInfo) -> BlockSummary {
    BlockSummary {
        hash: info.hash,
        height: info.height,
        time: info.time,
        size: info.size,
        tx_count: info.n_tx.unwrap_or_default(),
        miner: None,
    }
}

/// A transaction first seen inside a block
pub fn confirmed_summary(
    tx: &VerboseTransaction,
    block: &VerboseBlock,
) -> Result<TransactionSummary, RpcError> {
    Ok(TransactionSummary {
        txid: tx.txid,
        status: TxStatus::Confirmed,
        time: block.time,
        amount: tx.total_output()?,
        has_tokens: tx.has_tokens(),
        fee: tx.fee,
        size: tx.size,
        block_height: Some(block.height),
        confirmations: Some(1),
    })
}

/// A mempool arrival with full node detail
pub fn mempool_summary(
    tx: &VerboseTransaction,
    time: u32,
    raw_len: usize,
) -> Result<TransactionSummary, RpcError> {
    Ok(TransactionSummary {
        txid: tx.txid,
        status: TxStatus::Mempool,
        time,
        amount: tx.total_output()?,
        has_tokens: tx.has_tokens(),
        fee: None,
        size: Some(raw_len as u32),
        block_height: None,
        confirmations: None,
    })
}

/// A mempool arrival known only from its raw bytes. Token outputs count only
/// when `token_aware` is set.
pub fn decoded_summary(
    tx: &DecodedTransaction,
    time: u32,
    token_aware: bool,
) -> Result<TransactionSummary, CodecError> {
    Ok(TransactionSummary {
        txid: tx.txid,
        status: TxStatus::Mempool,
        time,
        amount: tx.total_output()?,
        has_tokens: token_aware && tx.has_tokens(),
        fee: None,
        size: Some(tx.size as u32),
        block_height: None,
        confirmations: None,
    })
}

/// A mempool entry fetched during the initial sync
pub fn mempool_entry_summary(
    txid: Txid,
    entry: &MempoolEntry,
    tx: &VerboseTransaction,
) -> Result<TransactionSummary, RpcError> {
    Ok(TransactionSummary {
        txid,
        status: TxStatus::Mempool,
        time: entry
            .time
            .and_then(|t| u32::try_from(t).ok())
            .or(tx.time)
            .unwrap_or_default(),
        amount: tx.total_output()?,
        has_tokens: tx.has_tokens(),
        fee: entry.fee().filter(|fee| *fee > Amount::ZERO),
        size: entry.size.or(tx.size),
        block_height: None,
        confirmations: None,
    })
}

pub fn unix_now() -> u32 {
    u32::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
