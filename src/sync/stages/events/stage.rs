use gasket::framework::*;
use tracing::{debug, info};
use zeromq::{Socket, SocketRecv, SubSocket};

use crate::sync::stages::{NodeEvent, TOPIC_RAW_BLOCK, TOPIC_RAW_TX};

use super::feed::FeedTracker;

/*
    Events Stage

    Subscribes to the node's pub/sub feed for raw blocks and raw
    transactions and passes each notification downstream, in arrival order,
    to the ingest stage. A broken connection restarts the stage, which
    reconnects under the pipeline's backoff policy.
*/

pub type DownstreamPort = gasket::messaging::OutputPort<NodeEvent>;

#[derive(Stage)]
#[stage(name = "events", unit = "NodeEvent", worker = "Worker")]
pub struct Stage {
    endpoint: String,

    pub downstream: DownstreamPort,
}

impl Stage {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            downstream: Default::default(),
        }
    }
}

#[async_trait::async_trait(?Send)]
impl gasket::framework::Worker<Stage> for Worker {
    async fn bootstrap(stage: &Stage) -> Result<Self, WorkerError> {
        info!("connecting to node event feed {}...", stage.endpoint);

        let mut socket = SubSocket::new();

        socket.connect(&stage.endpoint).await.or_retry()?;

        for topic in [TOPIC_RAW_BLOCK, TOPIC_RAW_TX] {
            socket.subscribe(topic).await.or_retry()?;
        }

        info!(
            endpoint = %stage.endpoint,
            "subscribed to {TOPIC_RAW_BLOCK} and {TOPIC_RAW_TX}"
        );

        Ok(Worker {
            socket: Some(socket),
            feed: FeedTracker::new(),
        })
    }

    async fn schedule(
        &mut self,
        _stage: &mut Stage,
    ) -> Result<WorkSchedule<NodeEvent>, WorkerError> {
        let socket = self.socket.as_mut().ok_or(WorkerError::Restart)?;

        loop {
            let message = socket.recv().await.or_restart()?;
            let mut frames = message.into_vec().into_iter();

            let (Some(topic), Some(body)) = (frames.next(), frames.next()) else {
                debug!("dropping notification without a body frame");
                continue;
            };

            let topic_name = String::from_utf8_lossy(&topic).into_owned();

            if let Some(sequence) = frames.next() {
                self.feed.observe(&topic_name, &sequence);
            }

            match NodeEvent::from_topic(&topic, body.to_vec()) {
                Some(event) => {
                    self.feed.event_received();
                    return Ok(WorkSchedule::Unit(event));
                }
                None => debug!(topic = topic_name, "ignoring notification on unknown topic"),
            }
        }
    }

    async fn execute(&mut self, unit: &NodeEvent, stage: &mut Stage) -> Result<(), WorkerError> {
        stage
            .downstream
            .send(unit.clone().into())
            .await
            .or_panic()?;

        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), WorkerError> {
        if let Some(socket) = self.socket.take() {
            let _ = socket.close().await;
        }

        info!("node event feed closed");

        Ok(())
    }
}

pub struct Worker {
    socket: Option<SubSocket>,
    feed: FeedTracker,
}
