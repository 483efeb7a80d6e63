use std::{collections::HashSet, str::FromStr, sync::Arc, time::Duration};

use bitcoin::{BlockHash, Txid};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    CacheStore, Config, StoreError,
    model::{BlockSummary, TransactionSummary},
};

#[derive(Debug, Clone)]
struct Keys {
    prefix: String,
    blocks: String,
    transactions: String,
    mempool: String,
}

impl Keys {
    fn new(prefix: &str) -> Self {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}:")
        };

        Self {
            blocks: format!("{prefix}blocks:latest"),
            transactions: format!("{prefix}txs:latest"),
            mempool: format!("{prefix}mempool:txids"),
            prefix,
        }
    }

    fn detail(&self, txid: &Txid) -> String {
        format!("{}tx:{txid}", self.prefix)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStatus {
    pub blocks: usize,
    pub transactions: usize,
    pub mempool: usize,
}

/// Typed view of the shared cache: the bounded latest-blocks and
/// latest-transactions lists (newest at the head), the mempool txid set and
/// short-lived transaction detail entries.
#[derive(Clone)]
pub struct ChainCache {
    store: Arc<dyn CacheStore>,
    keys: Keys,
    max_blocks: usize,
    max_transactions: usize,
    detail_ttl: Duration,
}

impl ChainCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &Config) -> Self {
        Self {
            store,
            keys: Keys::new(config.prefix()),
            max_blocks: config.max_blocks(),
            max_transactions: config.max_transactions(),
            detail_ttl: config.detail_ttl(),
        }
    }

    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    pub fn max_transactions(&self) -> usize {
        self.max_transactions
    }

    pub async fn blocks(&self) -> Result<Vec<BlockSummary>, StoreError> {
        let raw = self.store.list_range(&self.keys.blocks, 0, -1).await?;
        Ok(parse_entries(&self.keys.blocks, &raw))
    }

    pub async fn latest_block(&self) -> Result<Option<BlockSummary>, StoreError> {
        let raw = self.store.list_index(&self.keys.blocks, 0).await?;
        Ok(raw.and_then(|r| serde_json::from_str(&r).ok()))
    }

    /// Insert at the head, replacing any entry with the same hash, then trim
    /// to capacity
    pub async fn push_block(&self, block: &BlockSummary) -> Result<(), StoreError> {
        let key = &self.keys.blocks;

        for raw in self.store.list_range(key, 0, -1).await? {
            let same =
                serde_json::from_str::<BlockSummary>(&raw).is_ok_and(|b| b.hash == block.hash);

            if same {
                self.store.list_remove(key, &raw).await?;
            }
        }

        self.store
            .list_push_front(key, serde_json::to_string(block)?)
            .await?;

        self.store
            .list_trim(key, 0, self.max_blocks as isize - 1)
            .await
    }

    pub async fn remove_block(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        let key = &self.keys.blocks;
        let mut removed = false;

        for raw in self.store.list_range(key, 0, -1).await? {
            let same = serde_json::from_str::<BlockSummary>(&raw).is_ok_and(|b| b.hash == *hash);

            if same {
                removed |= self.store.list_remove(key, &raw).await? > 0;
            }
        }

        Ok(removed)
    }

    pub async fn clear_blocks(&self) -> Result<(), StoreError> {
        self.store.delete(&self.keys.blocks).await
    }

    pub async fn transactions(&self) -> Result<Vec<TransactionSummary>, StoreError> {
        let raw = self
            .store
            .list_range(&self.keys.transactions, 0, -1)
            .await?;
        Ok(parse_entries(&self.keys.transactions, &raw))
    }

    /// Insert at the head, replacing any entry with the same txid. A token
    /// flag seen on an earlier copy is kept. Mempool entries that fall off
    /// the tail leave the mempool set with them. Returns what was stored.
    pub async fn push_transaction(
        &self,
        mut tx: TransactionSummary,
    ) -> Result<TransactionSummary, StoreError> {
        let key = &self.keys.transactions;

        for raw in self.store.list_range(key, 0, -1).await? {
            let Ok(existing) = serde_json::from_str::<TransactionSummary>(&raw) else {
                continue;
            };

            if existing.txid == tx.txid {
                tx.has_tokens |= existing.has_tokens;
                self.store.list_remove(key, &raw).await?;
            }
        }

        self.store
            .list_push_front(key, serde_json::to_string(&tx)?)
            .await?;

        let cap = self.max_transactions as isize;
        let evicted = self.store.list_range(key, cap, -1).await?;

        for old in parse_entries::<TransactionSummary>(key, &evicted) {
            if old.is_mempool() && old.txid != tx.txid {
                debug!(txid = %old.txid, "mempool transaction evicted from latest list");
                self.store
                    .set_remove(&self.keys.mempool, &old.txid.to_string())
                    .await?;
            }
        }

        self.store.list_trim(key, 0, cap - 1).await?;

        Ok(tx)
    }

    /// Update every cached copy of `txid` in place to confirmed and drop it
    /// from the mempool set. Returns whether a cached copy existed.
    pub async fn mark_confirmed(
        &self,
        txid: &Txid,
        height: u32,
        confirmations: u32,
    ) -> Result<bool, StoreError> {
        let found = self
            .update_transaction(txid, |tx| tx.confirm(height, confirmations))
            .await?;

        self.remove_from_mempool(txid).await?;

        Ok(found)
    }

    /// Put a confirmed entry back to mempool status and into the mempool set
    pub async fn revert_to_mempool(&self, txid: &Txid) -> Result<bool, StoreError> {
        let found = self
            .update_transaction(txid, TransactionSummary::revert_to_mempool)
            .await?;

        if found {
            self.add_to_mempool(txid).await?;
        }

        Ok(found)
    }

    pub async fn remove_transaction(&self, txid: &Txid) -> Result<bool, StoreError> {
        let key = &self.keys.transactions;
        let mut removed = false;

        for raw in self.store.list_range(key, 0, -1).await? {
            let same =
                serde_json::from_str::<TransactionSummary>(&raw).is_ok_and(|t| t.txid == *txid);

            if same {
                removed |= self.store.list_remove(key, &raw).await? > 0;
            }
        }

        self.remove_from_mempool(txid).await?;

        Ok(removed)
    }

    async fn update_transaction<F>(&self, txid: &Txid, update: F) -> Result<bool, StoreError>
    where
        F: Fn(&mut TransactionSummary),
    {
        let key = &self.keys.transactions;
        let mut found = false;

        for (index, raw) in self.store.list_range(key, 0, -1).await?.iter().enumerate() {
            let Ok(mut tx) = serde_json::from_str::<TransactionSummary>(raw) else {
                continue;
            };

            if tx.txid != *txid {
                continue;
            }

            update(&mut tx);

            self.store
                .list_set(key, index as isize, serde_json::to_string(&tx)?)
                .await?;

            found = true;
        }

        Ok(found)
    }

    pub async fn add_to_mempool(&self, txid: &Txid) -> Result<(), StoreError> {
        self.store
            .set_add(&self.keys.mempool, &txid.to_string())
            .await
    }

    pub async fn remove_from_mempool(&self, txid: &Txid) -> Result<(), StoreError> {
        self.store
            .set_remove(&self.keys.mempool, &txid.to_string())
            .await
    }

    pub async fn in_mempool(&self, txid: &Txid) -> Result<bool, StoreError> {
        self.store
            .set_contains(&self.keys.mempool, &txid.to_string())
            .await
    }

    pub async fn mempool_txids(&self) -> Result<HashSet<Txid>, StoreError> {
        let members = self.store.set_members(&self.keys.mempool).await?;

        Ok(members
            .iter()
            .filter_map(|m| Txid::from_str(m).ok())
            .collect())
    }

    pub async fn store_detail(&self, txid: &Txid, detail: &Value) -> Result<(), StoreError> {
        self.store
            .put_with_ttl(
                &self.keys.detail(txid),
                serde_json::to_string(detail)?,
                self.detail_ttl,
            )
            .await
    }

    pub async fn detail(&self, txid: &Txid) -> Result<Option<Value>, StoreError> {
        match self.store.get(&self.keys.detail(txid)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn remove_detail(&self, txid: &Txid) -> Result<(), StoreError> {
        self.store.delete(&self.keys.detail(txid)).await
    }

    pub async fn status(&self) -> Result<CacheStatus, StoreError> {
        Ok(CacheStatus {
            blocks: self.store.list_range(&self.keys.blocks, 0, -1).await?.len(),
            transactions: self
                .store
                .list_range(&self.keys.transactions, 0, -1)
                .await?
                .len(),
            mempool: self.store.set_members(&self.keys.mempool).await?.len(),
        })
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.store.close().await
    }
}

fn parse_entries<T: DeserializeOwned>(key: &str, raw: &[String]) -> Vec<T> {
    raw.iter()
        .filter_map(|r| match serde_json::from_str(r) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(key, "skipping unreadable cache entry: {err}");
                None
            }
        })
        .collect()
}
