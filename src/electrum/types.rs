use bitcoin::Txid;
use serde::Deserialize;
use serde_json::Value;

use crate::codec::header::header_time_from_hex;

/// Result of `blockchain.headers.subscribe`, also pushed as a notification
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HeaderNotification {
    pub height: u32,
    pub hex: String,
}

impl HeaderNotification {
    pub fn time(&self) -> Option<u32> {
        header_time_from_hex(&self.hex)
    }
}

/// Satoshi balances; unconfirmed may be negative
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct Balance {
    pub confirmed: i64,
    pub unconfirmed: i64,
}

/// History and mempool entries. Heights of 0 or -1 mean unconfirmed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HistoryItem {
    pub tx_hash: Txid,
    pub height: i64,
    pub fee: Option<u64>,
}

impl HistoryItem {
    pub fn is_confirmed(&self) -> bool {
        self.height > 0
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Utxo {
    pub tx_hash: Txid,
    pub tx_pos: u32,
    pub height: i64,
    pub value: u64,
    pub token_data: Option<Value>,
}
