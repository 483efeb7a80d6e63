use std::{collections::HashMap, str::FromStr};

use bitcoin::{OutPoint, Script, Txid};
use itertools::Itertools;
use tracing::warn;

use crate::{
    Config,
    codec::{
        cashaddr::CashAddress,
        decode_transaction,
        flow::AddressFlow,
        script::locking_script,
        transaction::{DecodedOutput, DecodedTransaction},
    },
    electrum::{self, ElectrumClient, types::HistoryItem},
    error::Error,
    rpc::{NodeRpc, client::RpcClient},
    storage::{self, ChainCache},
};

/// History entries shown for an address lookup
const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Print the cached block and transaction lists
    Cache,
    /// Whether an output is still unspent
    TxOut(OutPoint),
    /// Balance and recent activity of a cash address
    Address(CashAddress),
}

impl FromStr for Query {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s == "cache" {
            return Ok(Query::Cache);
        }

        if let Some((txid, vout)) = s.split_once(':') {
            if let (Ok(txid), Ok(vout)) = (txid.parse::<Txid>(), vout.parse::<u32>()) {
                return Ok(Query::TxOut(OutPoint::new(txid, vout)));
            }
        }

        Ok(Query::Address(CashAddress::decode(s)?))
    }
}

/// Connects only to the backends `query` needs
pub async fn run(query: &Query, config: &Config) -> Result<(), Error> {
    match query {
        Query::Cache => {
            let store = storage::connect(&config.cache).await?;
            let cache = ChainCache::new(store, &config.cache);

            let result = dump_cache(&cache).await;
            cache.close().await?;

            result
        }
        Query::TxOut(outpoint) => {
            let rpc = RpcClient::new(&config.node, &config.rpc)?;

            match rpc.get_tx_out(&outpoint.txid, outpoint.vout, true).await {
                Ok(Some(out)) => println!(
                    "{outpoint} unspent: {} ({} confirmations)",
                    out.value, out.confirmations
                ),
                Ok(None) => println!("{outpoint} spent or unknown"),
                Err(e) => {
                    warn!("gettxout failed: {e}");
                    println!("{outpoint} status unknown");
                }
            }

            Ok(())
        }
        Query::Address(address) => {
            let electrum = config.electrum.as_ref().ok_or_else(|| {
                Error::Config("address lookups need an [electrum] section".into())
            })?;

            lookup_address(address, electrum).await
        }
    }
}

async fn dump_cache(cache: &ChainCache) -> Result<(), Error> {
    let status = cache.status().await?;

    println!(
        "{} blocks, {} transactions, {} in mempool set",
        status.blocks, status.transactions, status.mempool
    );

    for block in cache.blocks().await? {
        println!(
            ">> block {} {} txs={} miner={}",
            block.height,
            block.hash,
            block.tx_count,
            block.miner.as_deref().unwrap_or("-")
        );
    }

    for tx in cache.transactions().await? {
        println!(
            ">> tx {} {:?} {} tokens={}",
            tx.txid, tx.status, tx.amount, tx.has_tokens
        );
    }

    Ok(())
}

async fn lookup_address(address: &CashAddress, config: &electrum::Config) -> Result<(), Error> {
    let script = locking_script(address)?;
    let client = ElectrumClient::connect(config).await?;

    let balance = client.get_balance(&script).await?;
    let mempool = client.get_mempool(&script).await?;

    println!("{}", address.encode()?);
    println!(
        "balance: {} sats confirmed, {} sats unconfirmed, {} mempool txs",
        balance.confirmed,
        balance.unconfirmed,
        mempool.len()
    );

    let history = client.get_history(&script).await?;
    let mut lookups = TxLookup::new(&client);

    for item in recent(history) {
        let line = match lookups.flow(&item.tx_hash, &script).await {
            Ok(flow) => format!(
                "{} {:+} sats{}",
                flow.direction(),
                flow.net.to_sat(),
                if flow.touches_tokens { " (tokens)" } else { "" }
            ),
            Err(e) => format!("flow unavailable: {e}"),
        };

        let status = if item.is_confirmed() {
            format!("height {}", item.height)
        } else {
            "mempool".to_string()
        };

        println!(">> {} [{status}] {line}", item.tx_hash);
    }

    Ok(())
}

/// Newest first: unconfirmed entries, then by descending height
fn recent(history: Vec<HistoryItem>) -> Vec<HistoryItem> {
    history
        .into_iter()
        .sorted_by_key(|item| {
            let height = if item.is_confirmed() { item.height } else { i64::MAX };
            std::cmp::Reverse(height)
        })
        .take(HISTORY_LIMIT)
        .collect()
}

/// Fetches and decodes transactions over Electrum, remembering each one
struct TxLookup<'a> {
    client: &'a ElectrumClient,
    seen: HashMap<Txid, DecodedTransaction>,
}

impl<'a> TxLookup<'a> {
    fn new(client: &'a ElectrumClient) -> Self {
        Self {
            client,
            seen: HashMap::new(),
        }
    }

    async fn get(&mut self, txid: &Txid) -> Result<DecodedTransaction, Error> {
        if let Some(tx) = self.seen.get(txid) {
            return Ok(tx.clone());
        }

        let raw = self.client.transaction_get(txid).await?;
        let tx = decode_transaction(&raw)?;
        self.seen.insert(*txid, tx.clone());

        Ok(tx)
    }

    async fn flow(&mut self, txid: &Txid, script: &Script) -> Result<AddressFlow, Error> {
        let tx = self.get(txid).await?;
        let mut prevouts: HashMap<OutPoint, DecodedOutput> = HashMap::new();

        for input in tx.inputs.iter().filter(|i| !i.is_coinbase()) {
            let prev = self.get(&input.prev_txid).await?;

            if let Some(output) = prev.outputs.get(input.prev_vout as usize) {
                prevouts.insert(input.outpoint(), output.clone());
            }
        }

        AddressFlow::compute(&tx, script, &prevouts).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;

    use super::*;

    #[test]
    fn parses_query_kinds() {
        assert_eq!("cache".parse::<Query>().unwrap(), Query::Cache);

        let txid = Txid::from_byte_array([7; 32]);
        assert_eq!(
            format!("{txid}:3").parse::<Query>().unwrap(),
            Query::TxOut(OutPoint::new(txid, 3))
        );

        let address = "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"
            .parse::<Query>()
            .unwrap();
        assert!(matches!(address, Query::Address(a) if a.prefix == "bitcoincash"));

        assert!("not-an-address".parse::<Query>().is_err());
    }

    #[test]
    fn recent_history_puts_mempool_first() {
        let item = |byte: u8, height: i64| HistoryItem {
            tx_hash: Txid::from_byte_array([byte; 32]),
            height,
            fee: None,
        };

        let history = (1..=12).map(|h| item(h as u8, h)).chain([item(99, 0)]).collect();
        let heights = recent(history).iter().map(|i| i.height).collect::<Vec<_>>();

        assert_eq!(heights, vec![0, 12, 11, 10, 9, 8, 7, 6, 5, 4]);
    }
}
