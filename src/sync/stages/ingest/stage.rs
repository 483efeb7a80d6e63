use std::sync::Arc;

use gasket::framework::*;
use tracing::{error, info};

use crate::{rpc::NodeRpc, storage::ChainCache, sync::stages::NodeEvent};

use super::{Orchestrator, Settings};

/*
    Ingest Stage

    Receives node notifications from the events stage and applies them to
    the shared cache one at a time. A notification that fails is logged and
    dropped so a single bad event never stalls the feed.
*/

pub type UpstreamPort = gasket::messaging::InputPort<NodeEvent>;

#[derive(Stage)]
#[stage(name = "ingest", unit = "NodeEvent", worker = "Worker")]
pub struct Stage {
    cache: ChainCache,
    rpc: Arc<dyn NodeRpc>,
    settings: Settings,

    pub upstream: UpstreamPort,
}

impl Stage {
    pub fn new(cache: ChainCache, rpc: Arc<dyn NodeRpc>, settings: Settings) -> Self {
        Self {
            cache,
            rpc,
            settings,
            upstream: Default::default(),
        }
    }
}

#[async_trait::async_trait(?Send)]
impl gasket::framework::Worker<Stage> for Worker {
    async fn bootstrap(stage: &Stage) -> Result<Self, WorkerError> {
        let orchestrator = Orchestrator::resume(
            stage.cache.clone(),
            stage.rpc.clone(),
            stage.settings.clone(),
        )
        .await
        .or_retry()?;

        Ok(Worker { orchestrator })
    }

    async fn schedule(
        &mut self,
        stage: &mut Stage,
    ) -> Result<WorkSchedule<NodeEvent>, WorkerError> {
        let event = stage.upstream.recv().await.or_panic()?.payload;

        Ok(WorkSchedule::Unit(event))
    }

    async fn execute(&mut self, unit: &NodeEvent, _stage: &mut Stage) -> Result<(), WorkerError> {
        if let Err(e) = self.orchestrator.apply(unit).await {
            error!(topic = unit.topic(), "failed to apply notification: {e}");
        }

        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), WorkerError> {
        info!(last_known = ?self.orchestrator.last_known(), "ingest stage stopped");

        Ok(())
    }
}

pub struct Worker {
    orchestrator: Orchestrator,
}
