use bitcoin::{Amount, BlockHash, Txid};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RpcError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerboseBlock {
    pub hash: BlockHash,
    pub height: u32,
    pub time: u32,
    pub size: u32,
    #[serde(default)]
    pub previousblockhash: Option<BlockHash>,
    pub tx: Vec<VerboseTransaction>,
}

impl VerboseBlock {
    pub fn coinbase(&self) -> Option<&str> {
        self.tx.first()?.vin.first()?.coinbase.as_deref()
    }
}

/// Block at verbosity 1, transactions listed by id only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: BlockHash,
    pub height: u32,
    pub time: u32,
    pub size: u32,
    #[serde(default, rename = "nTx")]
    pub n_tx: Option<u32>,
    #[serde(default)]
    pub previousblockhash: Option<BlockHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerboseTransaction {
    pub txid: Txid,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub time: Option<u32>,
    #[serde(default)]
    pub blockhash: Option<BlockHash>,
    /// Present for non-coinbase transactions of a verbosity-2 block
    #[serde(default, with = "bitcoin::amount::serde::as_btc::opt")]
    pub fee: Option<Amount>,
    #[serde(default)]
    pub vin: Vec<VerboseInput>,
    #[serde(default)]
    pub vout: Vec<VerboseOutput>,
}

impl VerboseTransaction {
    pub fn total_output(&self) -> Result<Amount, RpcError> {
        self.vout.iter().try_fold(Amount::ZERO, |acc, o| {
            acc.checked_add(o.value).ok_or_else(|| {
                RpcError::Decode(format!("{}: output values overflow", self.txid))
            })
        })
    }

    pub fn has_tokens(&self) -> bool {
        self.vout.iter().any(|o| o.token_data.is_some())
            || self.vin.iter().any(|i| i.token_data.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerboseInput {
    #[serde(default)]
    pub coinbase: Option<String>,
    #[serde(default)]
    pub txid: Option<Txid>,
    #[serde(default)]
    pub vout: Option<u32>,
    #[serde(default, rename = "tokenData")]
    pub token_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerboseOutput {
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub value: Amount,
    pub n: u32,
    #[serde(default, rename = "scriptPubKey")]
    pub script_pub_key: Option<Value>,
    #[serde(default, rename = "tokenData")]
    pub token_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolEntry {
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default, with = "bitcoin::amount::serde::as_btc::opt")]
    pub fee: Option<Amount>,
    #[serde(default)]
    pub fees: Option<MempoolFees>,
}

impl MempoolEntry {
    /// Newer nodes report the fee under `fees.base`
    pub fn fee(&self) -> Option<Amount> {
        self.fees.as_ref().and_then(|f| f.base).or(self.fee)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolFees {
    #[serde(default, with = "bitcoin::amount::serde::as_btc::opt")]
    pub base: Option<Amount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    pub blocks: u32,
    pub headers: u32,
    pub bestblockhash: BlockHash,
    pub difficulty: f64,
    #[serde(default)]
    pub mediantime: Option<u64>,
    #[serde(default)]
    pub verificationprogress: Option<f64>,
    #[serde(default)]
    pub initialblockdownload: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub version: u64,
    pub subversion: String,
    #[serde(default)]
    pub connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeaderInfo {
    pub hash: BlockHash,
    pub height: u32,
    pub time: u32,
    #[serde(default)]
    pub previousblockhash: Option<BlockHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutInfo {
    pub bestblock: BlockHash,
    pub confirmations: u32,
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub value: Amount,
    #[serde(default, rename = "scriptPubKey")]
    pub script_pub_key: Option<Value>,
    #[serde(default, rename = "tokenData")]
    pub token_data: Option<Value>,
}
