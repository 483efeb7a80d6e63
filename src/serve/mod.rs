use std::{net::SocketAddr, sync::Arc};

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use axum_server::Server;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    electrum,
    error::Error,
    rpc::NodeRpc,
    storage::{ChainCache, model::BlockSummary},
    sync::summaries::unix_now,
};

use error::ServeError;
use status::Status;

mod error;
mod status;

pub static DEFAULT_SERVE_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ServerConfig {
    pub address: Option<String>,
}

impl ServerConfig {
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(DEFAULT_SERVE_ADDRESS)
    }
}

#[derive(Clone)]
pub struct AppState {
    cache: ChainCache,
    rpc: Arc<dyn NodeRpc>,
    electrum: Option<electrum::Config>,
}

impl AppState {
    pub fn new(
        cache: ChainCache,
        rpc: Arc<dyn NodeRpc>,
        electrum: Option<electrum::Config>,
    ) -> Self {
        Self {
            cache,
            rpc,
            electrum,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/tip", get(tip))
        .route("/status", get(status))
        .with_state(state)
}

pub async fn run(state: AppState, address: &str) -> Result<(), Error> {
    let addr = address
        .parse::<SocketAddr>()
        .map_err(|e| Error::Config(format!("invalid serve address '{address}': {e}")))?;

    info!("api listening on {}...", addr);

    Server::bind(addr)
        .serve(router(state).into_make_service())
        .await?;

    Ok(())
}

async fn root() -> &'static str {
    "cashfeed status server"
}

async fn tip(State(state): State<AppState>) -> Result<Json<BlockSummary>, ServeError> {
    state
        .cache
        .latest_block()
        .await?
        .map(Json)
        .ok_or(ServeError::NotFound)
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let node = status::node_status(state.rpc.as_ref()).await;

    let electrum = match &state.electrum {
        Some(config) => Some(status::electrum_status(config).await),
        None => None,
    };

    let comparison = electrum.as_ref().map(|e| status::compare(&node, e));

    let cache = match state.cache.status().await {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("could not read cache status: {e}");
            None
        }
    };

    Json(Status {
        generated_at: unix_now(),
        node,
        electrum,
        comparison,
        cache,
    })
}
