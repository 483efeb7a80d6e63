use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bitcoin::{BlockHash, Txid};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tracing::trace;

use super::{
    Config, NodeRpc, RpcError, WORK_QUEUE_EXCEEDED,
    breaker::CircuitBreaker,
    retry::RetryPolicy,
    types::{
        BlockHeaderInfo, BlockInfo, BlockchainInfo, MempoolEntry, NetworkInfo, TxOutInfo,
        VerboseBlock,
    },
};
use crate::sync::NodeConfig;

/// Per-call time limits, chosen by how much work the node does for a method
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub quick: Duration,
    pub standard: Duration,
    pub heavy: Duration,
}

impl Timeouts {
    pub fn for_call(&self, method: &str, params: &[Value]) -> Duration {
        match method {
            "getblock" if params.get(1).and_then(Value::as_u64) == Some(2) => self.heavy,
            "getrawmempool" => self.heavy,
            "getblock" | "getrawtransaction" | "getmempoolentry" | "gettxout" => self.standard,
            _ => self.quick,
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC client for the full node. One instance is shared by everything
/// that talks to the node, so the concurrency limit and the circuit breaker
/// apply process-wide.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
    timeouts: Timeouts,
    limiter: Semaphore,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(node: &NodeConfig, config: &Config) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RpcError::Transport(format!("building http client: {e}")))?;

        let auth = node.rpc_user.clone().zip(node.rpc_pass.clone());

        Ok(Self {
            http,
            url: node.rpc_url().to_string(),
            auth,
            timeouts: config.timeouts(),
            limiter: Semaphore::new(config.max_concurrent()),
            breaker: config.breaker(),
            retry: config.retry_policy(),
            next_id: AtomicU64::new(0),
        })
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let params = params.as_slice();
        let timeout = self.timeouts.for_call(method, params);

        let result = self
            .retry
            .run(move |attempt| self.call_once(method, params, timeout, attempt))
            .await?;

        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }

    async fn call_once(
        &self,
        method: &str,
        params: &[Value],
        timeout: Duration,
        attempt: u32,
    ) -> Result<Value, RpcError> {
        // permit is held only for the request itself, never across a backoff
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| RpcError::Transport("request limiter closed".into()))?;

        let admission = self.breaker.try_acquire()?;

        trace!(method, attempt, "calling node");
        let outcome = self.post(method, params, timeout).await;

        admission.record(matches!(outcome, Err(RpcError::Overloaded)));

        outcome
    }

    async fn post(
        &self,
        method: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let request = Request {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self.http.post(&self.url).timeout(timeout).json(&request);

        if let Some((user, pass)) = &self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(method, e))?;

        classify_response(status, &body)
    }
}

/// Map a raw node reply to a result. The overload text wins over anything
/// else; a JSON-RPC body wins over the HTTP status.
pub fn classify_response(status: u16, body: &str) -> Result<Value, RpcError> {
    if body.to_ascii_lowercase().contains(WORK_QUEUE_EXCEEDED) {
        return Err(RpcError::Overloaded);
    }

    match serde_json::from_str::<Response>(body) {
        Ok(Response {
            error: Some(error), ..
        }) => Err(RpcError::Protocol {
            code: error.code,
            message: error.message,
        }),
        Ok(Response { result, .. }) if status < 400 => Ok(result),
        Ok(_) => Err(RpcError::Http(status)),
        Err(_) if status >= 400 => Err(RpcError::Http(status)),
        Err(e) => Err(RpcError::Decode(e.to_string())),
    }
}

fn transport_error(method: &str, error: reqwest::Error) -> RpcError {
    if error.is_timeout() {
        RpcError::Transport(format!("{method} timed out"))
    } else {
        RpcError::Transport(format!("{method}: {error}"))
    }
}

#[async_trait]
impl NodeRpc for RpcClient {
    async fn get_block_count(&self) -> Result<u32, RpcError> {
        self.call("getblockcount", vec![]).await
    }

    async fn get_block_hash(&self, height: u32) -> Result<BlockHash, RpcError> {
        self.call("getblockhash", vec![json!(height)]).await
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<VerboseBlock, RpcError> {
        self.call("getblock", vec![json!(hash.to_string()), json!(2)])
            .await
    }

    async fn get_block_info(&self, hash: &BlockHash) -> Result<BlockInfo, RpcError> {
        self.call("getblock", vec![json!(hash.to_string()), json!(1)])
            .await
    }

    async fn get_block_header(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError> {
        self.call("getblockheader", vec![json!(hash.to_string()), json!(true)])
            .await
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Value, RpcError> {
        self.call("getrawtransaction", vec![json!(txid.to_string()), json!(2)])
            .await
    }

    async fn get_raw_mempool(&self) -> Result<HashMap<String, MempoolEntry>, RpcError> {
        self.call("getrawmempool", vec![json!(true)]).await
    }

    async fn get_mempool_entry(&self, txid: &Txid) -> Result<MempoolEntry, RpcError> {
        self.call("getmempoolentry", vec![json!(txid.to_string())])
            .await
    }

    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.call("getblockchaininfo", vec![]).await
    }

    async fn get_network_info(&self) -> Result<NetworkInfo, RpcError> {
        self.call("getnetworkinfo", vec![]).await
    }

    async fn get_tx_out(
        &self,
        txid: &Txid,
        vout: u32,
        include_mempool: bool,
    ) -> Result<Option<TxOutInfo>, RpcError> {
        self.call(
            "gettxout",
            vec![json!(txid.to_string()), json!(vout), json!(include_mempool)],
        )
        .await
    }
}
