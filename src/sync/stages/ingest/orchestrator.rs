use std::sync::Arc;

use bitcoin::{BlockHash, Txid};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{IngestError, reorg};
use crate::{
    codec,
    rpc::{
        NodeRpc, RpcError,
        types::{VerboseBlock, VerboseTransaction},
    },
    storage::ChainCache,
    sync::{
        self,
        stages::NodeEvent,
        summaries::{
            block_summary, block_summary_from_info, confirmed_summary, decoded_summary,
            mempool_summary, unix_now,
        },
    },
};

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_reorg_depth: usize,
    pub fill_gaps: bool,
    pub revert_orphaned_txs: bool,
    pub token_aware_fallback: bool,
}

impl From<&sync::Config> for Settings {
    fn from(config: &sync::Config) -> Self {
        Self {
            max_reorg_depth: config.max_reorg_depth(),
            fill_gaps: config.fill_gaps(),
            revert_orphaned_txs: config.revert_orphaned_txs(),
            token_aware_fallback: config.token_aware_fallback(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from(&sync::Config::default())
    }
}

/// Applies node notifications to the shared cache, one at a time. Holds the
/// hash of the last block it applied so it can notice forks and gaps.
pub struct Orchestrator {
    cache: ChainCache,
    rpc: Arc<dyn NodeRpc>,
    settings: Settings,
    last_known: Option<BlockHash>,
}

impl Orchestrator {
    pub fn new(cache: ChainCache, rpc: Arc<dyn NodeRpc>, settings: Settings) -> Self {
        Self {
            cache,
            rpc,
            settings,
            last_known: None,
        }
    }

    /// Start from the newest block already in the cache
    pub async fn resume(
        cache: ChainCache,
        rpc: Arc<dyn NodeRpc>,
        settings: Settings,
    ) -> Result<Self, IngestError> {
        let latest = cache.latest_block().await?;

        if let Some(block) = &latest {
            info!(height = block.height, hash = %block.hash, "resuming from cached tip");
        }

        let mut orchestrator = Self::new(cache, rpc, settings);
        orchestrator.last_known = latest.map(|b| b.hash);

        Ok(orchestrator)
    }

    pub fn last_known(&self) -> Option<BlockHash> {
        self.last_known
    }

    pub async fn apply(&mut self, event: &NodeEvent) -> Result<(), IngestError> {
        match event {
            NodeEvent::RawBlock(bytes) => self.apply_raw_block(bytes).await,
            NodeEvent::RawTx(bytes) => self.apply_raw_tx(bytes).await,
        }
    }

    async fn apply_raw_block(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        let hash = codec::block_hash(bytes)?;

        if self.last_known == Some(hash) {
            debug!(%hash, "ignoring repeated block notification");
            return Ok(());
        }

        let block = self.rpc.get_block(&hash).await?;

        if let Some(last) = self.last_known {
            if block.previousblockhash != Some(last) {
                info!(
                    height = block.height,
                    %hash,
                    expected_parent = %last,
                    "new block does not extend the last known block"
                );

                self.reconcile_fork(&block).await?;
            }
        }

        let summary = block_summary(&block);
        self.cache.push_block(&summary).await?;
        self.last_known = Some(summary.hash);

        let (confirmed, added) = self.apply_block_transactions(&block).await?;

        info!(
            height = summary.height,
            hash = %summary.hash,
            txs = summary.tx_count,
            confirmed,
            added,
            miner = summary.miner.as_deref().unwrap_or("unknown"),
            "applied block"
        );

        Ok(())
    }

    /// Confirm cached mempool transactions and insert the rest as confirmed.
    /// Only the newest transactions that can fit the bounded list are
    /// pushed.
    async fn apply_block_transactions(
        &self,
        block: &VerboseBlock,
    ) -> Result<(usize, usize), IngestError> {
        let mempool = self.cache.mempool_txids().await?;
        let mut unseen = Vec::new();
        let mut confirmed = 0;

        for tx in &block.tx {
            if mempool.contains(&tx.txid) {
                self.cache.mark_confirmed(&tx.txid, block.height, 1).await?;
                self.cache.remove_detail(&tx.txid).await?;
                confirmed += 1;
            } else {
                self.cache.remove_from_mempool(&tx.txid).await?;
                unseen.push(tx);
            }
        }

        let skip = unseen.len().saturating_sub(self.cache.max_transactions());
        let added = unseen.len() - skip;

        for tx in unseen.into_iter().skip(skip) {
            match confirmed_summary(tx, block) {
                Ok(summary) => {
                    self.cache.push_transaction(summary).await?;
                }
                Err(err) => warn!(txid = %tx.txid, "skipping block transaction: {err}"),
            }
        }

        Ok((confirmed, added))
    }

    async fn reconcile_fork(&mut self, block: &VerboseBlock) -> Result<(), IngestError> {
        let cached = self.cache.blocks().await?;

        let walk = reorg::find_common_ancestor(
            self.rpc.as_ref(),
            &cached,
            block.previousblockhash,
            self.settings.max_reorg_depth,
        )
        .await;

        self.last_known = None;

        let fork = match walk {
            Ok(fork) => fork,
            Err(
                err @ (IngestError::ReorgSafetyLimitExceeded { .. }
                | IngestError::NoCommonAncestor),
            ) => {
                warn!("{err}, clearing cached blocks");
                self.cache.clear_blocks().await?;
                return Ok(());
            }
            Err(err) => {
                warn!("fork walk failed, keeping cached blocks: {err}");
                return Ok(());
            }
        };

        let ancestor_height = fork.ancestor.height;
        let mut orphaned = 0;

        for stale in cached.iter().filter(|b| b.height > ancestor_height) {
            warn!(height = stale.height, hash = %stale.hash, "removing orphaned block");
            self.cache.remove_block(&stale.hash).await?;
            orphaned += 1;
        }

        if self.settings.revert_orphaned_txs {
            self.revert_orphaned_transactions(ancestor_height).await?;
        }

        let filled = if self.settings.fill_gaps {
            for info in &fork.canonical {
                self.cache.push_block(&block_summary_from_info(info)).await?;
            }
            fork.canonical.len()
        } else {
            0
        };

        info!(
            ancestor = ancestor_height,
            orphaned, filled, "reconciled fork with cached blocks"
        );

        Ok(())
    }

    /// Transactions confirmed above the fork point go back to the mempool if
    /// the node still has them there, otherwise they are dropped
    async fn revert_orphaned_transactions(&self, ancestor_height: u32) -> Result<(), IngestError> {
        let orphaned = self
            .cache
            .transactions()
            .await?
            .into_iter()
            .filter(|tx| tx.block_height.is_some_and(|h| h > ancestor_height));

        for tx in orphaned {
            match self.rpc.get_mempool_entry(&tx.txid).await {
                Ok(_) => {
                    debug!(txid = %tx.txid, "orphaned transaction back in mempool");
                    self.cache.revert_to_mempool(&tx.txid).await?;
                }
                Err(RpcError::Protocol { .. }) => {
                    debug!(txid = %tx.txid, "orphaned transaction gone from mempool");
                    self.cache.remove_transaction(&tx.txid).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    async fn apply_raw_tx(&mut self, bytes: &[u8]) -> Result<(), IngestError> {
        let txid = codec::compute_txid(bytes);
        let now = unix_now();

        let (summary, detail) = match self.fetch_detail(&txid).await {
            Ok((detail, tx)) => {
                if tx.blockhash.is_some() {
                    debug!(%txid, "transaction already confirmed, left to block processing");
                    return Ok(());
                }

                (mempool_summary(&tx, now, bytes.len())?, Some(detail))
            }
            Err(err) => {
                warn!(%txid, "node detail unavailable, decoding raw bytes: {err}");

                let decoded = codec::decode_transaction(bytes)?;
                let summary =
                    decoded_summary(&decoded, now, self.settings.token_aware_fallback)?;

                (summary, None)
            }
        };

        let stored = self.cache.push_transaction(summary).await?;
        self.cache.add_to_mempool(&txid).await?;

        if let Some(detail) = detail {
            self.cache.store_detail(&txid, &detail).await?;
        }

        debug!(
            %txid,
            amount = %stored.amount,
            tokens = stored.has_tokens,
            "applied mempool transaction"
        );

        Ok(())
    }

    async fn fetch_detail(&self, txid: &Txid) -> Result<(Value, VerboseTransaction), IngestError> {
        let detail = self.rpc.get_raw_transaction(txid).await?;

        let tx = serde_json::from_value(detail.clone()).map_err(|e| IngestError::InvalidDetail {
            txid: *txid,
            reason: e.to_string(),
        })?;

        Ok((detail, tx))
    }
}
