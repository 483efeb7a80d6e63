use std::{sync::Arc, time::Duration};

use tracing::info;

use crate::{
    rpc::NodeRpc,
    storage::ChainCache,
    sync::stages::{events, ingest},
};

use super::{Config, NodeConfig};

const DEFAULT_SYNC_STAGE_QUEUE_SIZE: usize = 20;
const DEFAULT_SYNC_STAGE_TIMEOUT_SECS: u64 = 600;

// Reconnect backoff for the event feed: 1s doubling up to 30s
fn gasket_policy(stage_timeout: u64) -> gasket::runtime::Policy {
    let default_retries = gasket::retries::Policy {
        max_retries: usize::MAX,
        backoff_unit: Duration::from_secs(1),
        backoff_factor: 2,
        max_backoff: Duration::from_secs(30),
        ..Default::default()
    };

    gasket::runtime::Policy {
        tick_timeout: Duration::from_secs(stage_timeout).into(),
        bootstrap_retry: default_retries.clone(),
        work_retry: default_retries.clone(),
        teardown_retry: default_retries,
    }
}

pub fn pipeline(
    node: &NodeConfig,
    config: &Config,
    cache: ChainCache,
    rpc: Arc<dyn NodeRpc>,
) -> gasket::daemon::Daemon {
    let mut events = events::Stage::new(node.zmq_address());
    let mut ingest = ingest::Stage::new(cache, rpc, ingest::Settings::from(config));

    let queue_size = config
        .stage_queue_size
        .unwrap_or(DEFAULT_SYNC_STAGE_QUEUE_SIZE);
    let stage_timeout = config
        .stage_timeout_secs
        .unwrap_or(DEFAULT_SYNC_STAGE_TIMEOUT_SECS);

    let (events_to_ingest, ingest_from_events) =
        gasket::messaging::tokio::mpsc_channel(queue_size);
    events.downstream.connect(events_to_ingest);
    ingest.upstream.connect(ingest_from_events);

    let policy = gasket_policy(stage_timeout);

    info!(queue_size, "spawning ingestion pipeline");

    let events = gasket::runtime::spawn_stage(events, policy.clone());
    let ingest = gasket::runtime::spawn_stage(ingest, policy);

    gasket::daemon::Daemon::new(vec![events, ingest])
}
