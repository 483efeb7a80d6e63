use std::time::Instant;

use serde::Serialize;

use crate::{
    electrum::{self, ElectrumClient},
    rpc::NodeRpc,
    storage::cache::CacheStatus,
};

/// Headers further apart in time than this count as out of sync
const MAX_TIME_DIFF_SECS: i64 = 2 * 60 * 60;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_block_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_block_download: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subversion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<u32>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectrumStatus {
    pub ok: bool,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_time: Option<u32>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub height_diff: Option<i64>,
    pub time_diff_seconds: Option<i64>,
    pub in_sync: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub generated_at: u32,
    pub node: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electrum: Option<ElectrumStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStatus>,
}

pub async fn node_status(rpc: &dyn NodeRpc) -> NodeStatus {
    let started = Instant::now();

    let (chain, network) = match (rpc.get_blockchain_info().await, rpc.get_network_info().await)
    {
        (Ok(chain), Ok(network)) => (chain, network),
        (Err(e), _) | (_, Err(e)) => {
            return NodeStatus {
                error: Some(e.to_string()),
                ..Default::default()
            };
        }
    };

    let latency_ms = started.elapsed().as_millis() as u64;

    // header time is optional
    let best_block_time = rpc
        .get_block_header(&chain.bestblockhash)
        .await
        .ok()
        .map(|h| h.time);

    NodeStatus {
        ok: true,
        error: None,
        latency_ms: Some(latency_ms),
        chain: Some(chain.chain),
        blocks: Some(chain.blocks),
        headers: Some(chain.headers),
        best_block_hash: Some(chain.bestblockhash.to_string()),
        best_block_time,
        verification_progress: chain.verificationprogress,
        initial_block_download: chain.initialblockdownload,
        version: Some(network.version),
        subversion: Some(network.subversion),
        connections: network.connections,
    }
}

pub async fn electrum_status(config: &electrum::Config) -> ElectrumStatus {
    let started = Instant::now();

    let mut status = ElectrumStatus {
        address: config.address.clone(),
        ..Default::default()
    };

    let tip = match ElectrumClient::connect(config).await {
        Ok(client) => client.headers_subscribe().await,
        Err(e) => Err(e),
    };

    match tip {
        Ok(tip) => {
            status.ok = true;
            status.latency_ms = Some(started.elapsed().as_millis() as u64);
            status.header_time = tip.time();
            status.height = Some(tip.height);
        }
        Err(e) => status.error = Some(e.to_string()),
    }

    status
}

/// The indexer may trail the node by one block and still count as in sync
pub fn compare(node: &NodeStatus, electrum: &ElectrumStatus) -> Comparison {
    let height_diff = node
        .blocks
        .zip(electrum.height)
        .map(|(n, e)| n as i64 - e as i64);

    let time_diff_seconds = node
        .best_block_time
        .zip(electrum.header_time)
        .map(|(n, e)| n as i64 - e as i64);

    let in_sync = node.ok
        && electrum.ok
        && height_diff.is_some_and(|d| (0..=1).contains(&d))
        && time_diff_seconds.is_none_or(|d| d.abs() <= MAX_TIME_DIFF_SECS);

    Comparison {
        height_diff,
        time_diff_seconds,
        in_sync,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{FakeNode, chain};

    fn electrum_at(height: u32, header_time: u32) -> ElectrumStatus {
        ElectrumStatus {
            ok: true,
            height: Some(height),
            header_time: Some(header_time),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reports_node_tip_and_header_time() {
        let node = FakeNode::new();
        let blocks = chain(&node, 0, 5, None);

        let status = node_status(&node).await;

        assert!(status.ok);
        assert_eq!(status.blocks, Some(4));
        assert_eq!(status.best_block_hash, Some(blocks[4].hash.to_string()));
        assert_eq!(status.best_block_time, Some(blocks[4].time));
    }

    #[tokio::test]
    async fn empty_node_reports_the_error() {
        let status = node_status(&FakeNode::new()).await;

        assert!(!status.ok);
        assert!(status.error.is_some());
    }

    #[test]
    fn one_block_behind_is_in_sync() {
        let node = NodeStatus {
            ok: true,
            blocks: Some(101),
            best_block_time: Some(1_700_000_600),
            ..Default::default()
        };

        assert!(compare(&node, &electrum_at(100, 1_700_000_000)).in_sync);
        assert!(compare(&node, &electrum_at(101, 1_700_000_600)).in_sync);

        let behind = compare(&node, &electrum_at(98, 1_699_999_000));
        assert_eq!(behind.height_diff, Some(3));
        assert!(!behind.in_sync);

        let ahead = compare(&node, &electrum_at(102, 1_700_001_200));
        assert!(!ahead.in_sync);
    }
}
