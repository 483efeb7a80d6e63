use bitcoin::Txid;
use futures::{StreamExt, stream};
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    rpc::{NodeRpc, RpcError, types::VerboseTransaction},
    storage::ChainCache,
    sync::{
        stages::ingest::IngestError,
        summaries::{block_summary, mempool_entry_summary},
    },
};

pub const DEFAULT_SYNC_CONCURRENCY: usize = 5;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub skipped: bool,
    pub blocks: usize,
    pub transactions: usize,
}

/// Fill an empty cache with the newest blocks and mempool transactions.
/// Does nothing when the block list already has entries. Single blocks or
/// transactions that cannot be fetched are skipped; failing to read the
/// tip is an error.
pub async fn initial_sync(
    cache: &ChainCache,
    rpc: &dyn NodeRpc,
    concurrency: usize,
) -> Result<SyncReport, IngestError> {
    if let Some(latest) = cache.latest_block().await? {
        info!(
            height = latest.height,
            "cache already holds blocks, skipping initial sync"
        );

        return Ok(SyncReport {
            skipped: true,
            ..Default::default()
        });
    }

    let concurrency = concurrency.max(1);
    let tip = rpc.get_block_count().await?;

    let wanted = u32::try_from(cache.max_blocks()).unwrap_or(u32::MAX);
    let first = tip.saturating_add(1).saturating_sub(wanted);

    info!(tip, from = first, "starting initial sync");

    // buffered keeps the results in height order
    let fetched = stream::iter(first..=tip)
        .map(|height| async move {
            let hash = rpc.get_block_hash(height).await?;
            let block = rpc.get_block(&hash).await?;
            Ok::<_, RpcError>(block)
        })
        .buffered(concurrency)
        .collect::<Vec<_>>()
        .await;

    let mut report = SyncReport::default();

    for (height, result) in (first..=tip).zip(fetched) {
        match result {
            Ok(block) => {
                cache.push_block(&block_summary(&block)).await?;
                report.blocks += 1;
            }
            Err(e) => warn!(height, "skipping block during initial sync: {e}"),
        }
    }

    report.transactions = sync_mempool(cache, rpc, concurrency).await?;

    info!(
        blocks = report.blocks,
        transactions = report.transactions,
        "initial sync complete"
    );

    Ok(report)
}

async fn sync_mempool(
    cache: &ChainCache,
    rpc: &dyn NodeRpc,
    concurrency: usize,
) -> Result<usize, IngestError> {
    let entries = match rpc.get_raw_mempool().await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("could not list the mempool, starting without it: {e}");
            return Ok(0);
        }
    };

    let newest = entries
        .into_iter()
        .filter_map(|(txid, entry)| match txid.parse::<Txid>() {
            Ok(txid) => Some((txid, entry)),
            Err(e) => {
                warn!(%txid, "ignoring unparseable mempool txid: {e}");
                None
            }
        })
        .sorted_by(|(_, a), (_, b)| b.time.cmp(&a.time))
        .take(cache.max_transactions())
        .collect::<Vec<_>>();

    let details = stream::iter(newest.iter())
        .map(|(txid, _)| async move {
            let value = rpc.get_raw_transaction(txid).await?;
            serde_json::from_value::<VerboseTransaction>(value)
                .map_err(|e| RpcError::Decode(e.to_string()))
        })
        .buffered(concurrency)
        .collect::<Vec<_>>()
        .await;

    let mut pushed = 0;

    // oldest first so the newest ends at the head
    for ((txid, entry), detail) in newest.iter().zip(details).rev() {
        match detail.and_then(|tx| mempool_entry_summary(*txid, entry, &tx)) {
            Ok(summary) => {
                cache.push_transaction(summary).await?;
                cache.add_to_mempool(txid).await?;
                pushed += 1;
            }
            Err(e) => warn!(%txid, "skipping mempool transaction during initial sync: {e}"),
        }
    }

    Ok(pushed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bitcoin::hashes::Hash;

    use super::*;
    use crate::{
        storage::{self, memory_store::MemoryStore, model::TxStatus},
        sync::testing::{FakeNode, chain, verbose_tx},
    };

    fn cache() -> ChainCache {
        let config = storage::Config::default();
        let store = MemoryStore::new(1_000, config.detail_ttl());

        ChainCache::new(Arc::new(store), &config)
    }

    #[tokio::test]
    async fn fills_the_newest_blocks_oldest_first() {
        let node = FakeNode::new();
        chain(&node, 0, 101, None);
        let cache = cache();

        let report = initial_sync(&cache, &node, 4).await.unwrap();

        assert!(!report.skipped);
        assert_eq!(report.blocks, 15);

        let heights = cache
            .blocks()
            .await
            .unwrap()
            .iter()
            .map(|b| b.height)
            .collect::<Vec<_>>();

        assert_eq!(heights, (86..=100).rev().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn populated_cache_is_left_alone() {
        let node = FakeNode::new();
        let blocks = chain(&node, 0, 30, None);
        let cache = cache();

        cache
            .push_block(&crate::sync::summaries::block_summary(&blocks[3]))
            .await
            .unwrap();

        let report = initial_sync(&cache, &node, 4).await.unwrap();

        assert!(report.skipped);
        assert_eq!(cache.blocks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn keeps_the_most_recent_mempool_entries() {
        let node = FakeNode::new();
        chain(&node, 0, 3, None);

        for i in 0..25u8 {
            let txid = Txid::from_byte_array([i + 1; 32]);
            node.add_transaction(verbose_tx(txid, &[1_000 + i as u64], false));
            node.add_mempool_entry(txid, 1_700_000_000 + i as u64);
        }

        // listed by the node but gone by the time its detail is requested
        node.add_mempool_entry(Txid::from_byte_array([0xaa; 32]), 1_800_000_000);

        let cache = cache();
        let report = initial_sync(&cache, &node, 3).await.unwrap();

        assert_eq!(report.transactions, 19);

        let txs = cache.transactions().await.unwrap();

        assert_eq!(txs.len(), 19);
        assert_eq!(txs[0].txid, Txid::from_byte_array([25; 32]));
        assert_eq!(txs[0].time, 1_700_000_024);
        assert_eq!(txs[18].txid, Txid::from_byte_array([7; 32]));
        assert!(txs.iter().all(|tx| tx.status == TxStatus::Mempool));
        assert_eq!(cache.mempool_txids().await.unwrap().len(), 19);
    }

    #[tokio::test]
    async fn short_chain_syncs_from_genesis() {
        let node = FakeNode::new();
        chain(&node, 0, 4, None);
        let cache = cache();

        let report = initial_sync(&cache, &node, 2).await.unwrap();

        assert_eq!(report.blocks, 4);
        assert_eq!(cache.latest_block().await.unwrap().unwrap().height, 3);
    }
}
