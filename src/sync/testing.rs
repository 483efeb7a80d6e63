//! In-memory node used by the ingestion and sync tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bitcoin::{
    Amount, BlockHash, CompactTarget, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction,
    TxIn, TxMerkleNode, TxOut, Txid, Witness, absolute::LockTime, block, consensus,
    hashes::{Hash, sha256d},
    transaction::Version,
};
use serde_json::{Value, json};

use crate::{
    codec,
    rpc::{
        NodeRpc, RpcError,
        types::{
            BlockHeaderInfo, BlockInfo, BlockchainInfo, MempoolEntry, NetworkInfo, TxOutInfo,
            VerboseBlock, VerboseInput, VerboseOutput, VerboseTransaction,
        },
    },
};

#[derive(Default)]
struct FakeState {
    blocks: HashMap<BlockHash, VerboseBlock>,
    raw_headers: HashMap<BlockHash, Vec<u8>>,
    best_chain: BTreeMap<u32, BlockHash>,
    transactions: HashMap<Txid, VerboseTransaction>,
    mempool: HashMap<String, MempoolEntry>,
    fail_transactions: bool,
}

#[derive(Default)]
pub struct FakeNode {
    state: Mutex<FakeState>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a block and make it the best block at its height
    pub fn add_block(&self, block: VerboseBlock, raw_header: Vec<u8>) {
        let mut state = self.state();
        state.best_chain.insert(block.height, block.hash);
        state.raw_headers.insert(block.hash, raw_header);
        state.blocks.insert(block.hash, block);
    }

    /// Drop a block from the node's index, keeping its raw header
    pub fn forget_block(&self, hash: &BlockHash) {
        self.state().blocks.remove(hash);
    }

    pub fn raw_block(&self, hash: &BlockHash) -> Vec<u8> {
        self.state()
            .raw_headers
            .get(hash)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_transaction(&self, tx: VerboseTransaction) {
        self.state().transactions.insert(tx.txid, tx);
    }

    /// Append a registered transaction to a registered block
    pub fn include_transaction(&self, block: &BlockHash, txid: Txid) {
        let mut state = self.state();
        let tx = state.transactions.get(&txid).cloned();

        if let (Some(tx), Some(block)) = (tx, state.blocks.get_mut(block)) {
            block.tx.push(tx);
        }
    }

    pub fn add_mempool_entry(&self, txid: Txid, time: u64) {
        let entry = MempoolEntry {
            size: Some(200),
            time: Some(time),
            fee: Some(Amount::from_sat(220)),
            fees: None,
        };

        self.state().mempool.insert(txid.to_string(), entry);
    }

    /// Make every transaction lookup fail as if the node were unreachable
    pub fn fail_transactions(&self, fail: bool) {
        self.state().fail_transactions = fail;
    }
}

fn not_found(what: impl std::fmt::Display) -> RpcError {
    RpcError::Protocol {
        code: -5,
        message: format!("{what} not found"),
    }
}

#[async_trait]
impl NodeRpc for FakeNode {
    async fn get_block_count(&self) -> Result<u32, RpcError> {
        self.state()
            .best_chain
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| not_found("tip"))
    }

    async fn get_block_hash(&self, height: u32) -> Result<BlockHash, RpcError> {
        self.state()
            .best_chain
            .get(&height)
            .copied()
            .ok_or_else(|| not_found(height))
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<VerboseBlock, RpcError> {
        self.state()
            .blocks
            .get(hash)
            .cloned()
            .ok_or_else(|| not_found(hash))
    }

    async fn get_block_info(&self, hash: &BlockHash) -> Result<BlockInfo, RpcError> {
        let block = self.get_block(hash).await?;

        Ok(BlockInfo {
            hash: block.hash,
            height: block.height,
            time: block.time,
            size: block.size,
            n_tx: Some(block.tx.len() as u32),
            previousblockhash: block.previousblockhash,
        })
    }

    async fn get_block_header(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError> {
        let block = self.get_block(hash).await?;

        Ok(BlockHeaderInfo {
            hash: block.hash,
            height: block.height,
            time: block.time,
            previousblockhash: block.previousblockhash,
        })
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Value, RpcError> {
        let state = self.state();

        if state.fail_transactions {
            return Err(RpcError::Transport("connection refused".into()));
        }

        let tx = state.transactions.get(txid).ok_or_else(|| not_found(txid))?;

        serde_json::to_value(tx).map_err(|e| RpcError::Decode(e.to_string()))
    }

    async fn get_raw_mempool(&self) -> Result<HashMap<String, MempoolEntry>, RpcError> {
        Ok(self.state().mempool.clone())
    }

    async fn get_mempool_entry(&self, txid: &Txid) -> Result<MempoolEntry, RpcError> {
        self.state()
            .mempool
            .get(&txid.to_string())
            .cloned()
            .ok_or_else(|| not_found(txid))
    }

    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        let tip = self.get_block_count().await?;
        let best = self.get_block_hash(tip).await?;

        Ok(BlockchainInfo {
            chain: "regtest".into(),
            blocks: tip,
            headers: tip,
            bestblockhash: best,
            difficulty: 1.0,
            mediantime: None,
            verificationprogress: Some(1.0),
            initialblockdownload: Some(false),
        })
    }

    async fn get_network_info(&self) -> Result<NetworkInfo, RpcError> {
        Ok(NetworkInfo {
            version: 28_000_000,
            subversion: "/Bitcoin Cash Node:28.0.0/".into(),
            connections: Some(8),
        })
    }

    async fn get_tx_out(
        &self,
        _txid: &Txid,
        _vout: u32,
        _include_mempool: bool,
    ) -> Result<Option<TxOutInfo>, RpcError> {
        Ok(None)
    }
}

fn raw_header(prev: Option<BlockHash>, height: u32, salt: u32) -> Vec<u8> {
    let header = block::Header {
        version: block::Version::ONE,
        prev_blockhash: prev.unwrap_or_else(BlockHash::all_zeros),
        merkle_root: TxMerkleNode::all_zeros(),
        time: 1_600_000_000 + height * 600,
        bits: CompactTarget::from_consensus(0x1d00ffff),
        nonce: salt,
    };

    consensus::serialize(&header)
}

fn coinbase_tx(height: u32, salt: u32) -> VerboseTransaction {
    let seed = [height.to_le_bytes(), salt.to_le_bytes()].concat();
    let mut script = vec![0x03];
    script.extend_from_slice(&height.to_le_bytes()[..3]);
    script.extend_from_slice(b"/FakePool/");

    VerboseTransaction {
        txid: Txid::from_raw_hash(sha256d::Hash::hash(&seed)),
        size: Some(180),
        time: None,
        blockhash: None,
        fee: None,
        vin: vec![VerboseInput {
            coinbase: Some(hex::encode(script)),
            txid: None,
            vout: None,
            token_data: None,
        }],
        vout: vec![VerboseOutput {
            value: Amount::from_sat(312_500_000),
            n: 0,
            script_pub_key: None,
            token_data: None,
        }],
    }
}

/// Build a block on top of `prev`, register it with the node and return it.
/// `salt` tells apart competing blocks at the same height.
pub fn make_block(
    node: &FakeNode,
    prev: Option<BlockHash>,
    height: u32,
    salt: u32,
) -> VerboseBlock {
    let raw = raw_header(prev, height, salt);
    let hash = codec::block_hash(&raw).expect("valid header");

    let block = VerboseBlock {
        hash,
        height,
        time: 1_600_000_000 + height * 600,
        size: 1_000,
        previousblockhash: prev,
        tx: vec![coinbase_tx(height, salt)],
    };

    node.add_block(block.clone(), raw);
    block
}

/// `count` linked blocks starting at `start`
pub fn chain(
    node: &FakeNode,
    start: u32,
    count: u32,
    parent: Option<BlockHash>,
) -> Vec<VerboseBlock> {
    let mut prev = parent;

    (start..start + count)
        .map(|height| {
            let block = make_block(node, prev, height, 0);
            prev = Some(block.hash);
            block
        })
        .collect()
}

/// A competing child of `parent`
pub fn fork_block(node: &FakeNode, parent: &VerboseBlock, salt: u32) -> VerboseBlock {
    make_block(node, Some(parent.hash), parent.height + 1, salt)
}

/// Node detail for a transaction paying `outputs` satoshis
pub fn verbose_tx(txid: Txid, outputs: &[u64], tokens: bool) -> VerboseTransaction {
    let vout = outputs
        .iter()
        .enumerate()
        .map(|(n, sats)| VerboseOutput {
            value: Amount::from_sat(*sats),
            n: n as u32,
            script_pub_key: Some(json!({ "hex": "51" })),
            token_data: (tokens && n == 0)
                .then(|| json!({ "category": "ab".repeat(32), "amount": "10" })),
        })
        .collect();

    VerboseTransaction {
        txid,
        size: Some(226),
        time: None,
        blockhash: None,
        fee: Some(Amount::from_sat(226)),
        vin: vec![VerboseInput {
            coinbase: None,
            txid: Some(Txid::from_byte_array([0xee; 32])),
            vout: Some(0),
            token_data: None,
        }],
        vout,
    }
}

/// Legacy-serialized transaction; outputs flagged `true` carry a fungible
/// token prefix
pub fn raw_transaction(outputs: &[(u64, bool)]) -> Vec<u8> {
    let lock = ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([3; 20]));

    let output = outputs
        .iter()
        .map(|(sats, token)| {
            let mut segment = Vec::new();

            if *token {
                segment.push(codec::token::PREFIX_TOKEN);
                segment.extend_from_slice(&[0x5a; 32]);
                segment.push(0x10);
                segment.push(0x0a);
            }

            segment.extend_from_slice(lock.as_bytes());

            TxOut {
                value: Amount::from_sat(*sats),
                script_pubkey: ScriptBuf::from_bytes(segment),
            }
        })
        .collect();

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([0xee; 32]), 0),
            script_sig: ScriptBuf::from_bytes(vec![0x00]),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output,
    };

    consensus::serialize(&tx)
}
