use bitcoin::{Amount, BlockHash, Txid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub hash: BlockHash,
    pub height: u32,
    pub time: u32,
    pub size: u32,
    pub tx_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miner: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Mempool,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub txid: Txid,
    pub status: TxStatus,
    pub time: u32,
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub amount: Amount,
    pub has_tokens: bool,
    #[serde(
        default,
        with = "bitcoin::amount::serde::as_btc::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub fee: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u32>,
}

impl TransactionSummary {
    pub fn is_mempool(&self) -> bool {
        self.status == TxStatus::Mempool
    }

    pub fn confirm(&mut self, height: u32, confirmations: u32) {
        self.status = TxStatus::Confirmed;
        self.block_height = Some(height);
        self.confirmations = Some(confirmations);
    }

    pub fn revert_to_mempool(&mut self) {
        self.status = TxStatus::Mempool;
        self.block_height = None;
        self.confirmations = None;
    }
}
