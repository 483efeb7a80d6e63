use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use bitcoin::{Script, Txid};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use crate::codec::script::scripthash;

use super::{
    Config, ElectrumError,
    types::{Balance, HeaderNotification, HistoryItem, Utxo},
};

type Reply = Result<Value, ElectrumError>;

#[derive(Default)]
struct Pending {
    waiting: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    closed: AtomicBool,
}

impl Pending {
    fn waiting(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, id: u64) -> Option<oneshot::Sender<Reply>> {
        self.waiting().remove(&id)
    }

    /// Mark the connection dead and fail everything still waiting
    fn fail_all(&self) {
        self.closed.store(true, Ordering::SeqCst);

        for (_, waiter) in self.waiting().drain() {
            let _ = waiter.send(Err(ElectrumError::Closed));
        }
    }
}

/// A server push without an id, e.g. a new header
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<ErrorObject>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

pub struct ElectrumClient {
    egress_send: mpsc::Sender<String>,
    pending: Arc<Pending>,
    notifications: broadcast::Sender<Notification>,
    next_id: AtomicU64,
    timeout: Duration,
    ingress_handle: JoinHandle<()>,
    egress_handle: JoinHandle<()>,
}

impl ElectrumClient {
    pub async fn connect(config: &Config) -> Result<Self, ElectrumError> {
        let stream = tokio::time::timeout(config.timeout(), TcpStream::connect(&config.address))
            .await
            .map_err(|_| ElectrumError::Timeout("connect".into()))?
            .map_err(ElectrumError::Connect)?;

        // configure tcp
        let sock_ref = socket2::SockRef::from(&stream);
        let tcp_keepalive = socket2::TcpKeepalive::new()
            .with_time(Duration::from_secs(20))
            .with_interval(Duration::from_secs(20));

        sock_ref
            .set_tcp_keepalive(&tcp_keepalive)
            .map_err(ElectrumError::Connect)?;
        sock_ref
            .set_tcp_nodelay(true)
            .map_err(ElectrumError::Connect)?;

        debug!(address = %config.address, "connected to electrum server");

        Ok(Self::from_stream(stream, config.timeout()))
    }

    fn from_stream(stream: TcpStream, timeout: Duration) -> Self {
        let (stream_read, stream_write) = stream.into_split();

        let pending = Arc::new(Pending::default());
        let (notifications, _) = broadcast::channel(16);
        let (egress_send, egress_recv) = mpsc::channel(16);

        let ingress = {
            let pending = pending.clone();
            let notifications = notifications.clone();
            tokio::spawn(async move { run_ingress(stream_read, pending, notifications).await })
        };

        let egress = {
            let pending = pending.clone();
            tokio::spawn(async move { run_egress(stream_write, egress_recv, pending).await })
        };

        Self {
            egress_send,
            pending,
            notifications,
            next_id: AtomicU64::new(1),
            timeout,
            ingress_handle: ingress,
            egress_handle: egress,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.pending.closed.load(Ordering::SeqCst)
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ElectrumError> {
        if self.is_closed() {
            return Err(ElectrumError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let (reply_send, reply_recv) = oneshot::channel();
        self.pending.waiting().insert(id, reply_send);

        // the connection may have died between the first check and the insert
        if self.is_closed() {
            self.pending.take(id);
            return Err(ElectrumError::Closed);
        }

        trace!(id, method, "electrum request");

        if self.egress_send.send(line.to_string()).await.is_err() {
            self.pending.take(id);
            return Err(ElectrumError::Closed);
        }

        let result = match tokio::time::timeout(self.timeout, reply_recv).await {
            Ok(Ok(reply)) => reply?,
            Ok(Err(_)) => return Err(ElectrumError::Closed),
            Err(_) => {
                self.pending.take(id);
                return Err(ElectrumError::Timeout(method.to_string()));
            }
        };

        Ok(serde_json::from_value(result)?)
    }

    pub async fn headers_subscribe(&self) -> Result<HeaderNotification, ElectrumError> {
        self.request("blockchain.headers.subscribe", vec![]).await
    }

    pub async fn get_balance(&self, script: &Script) -> Result<Balance, ElectrumError> {
        self.request("blockchain.scripthash.get_balance", vec![json!(scripthash(script))])
            .await
    }

    pub async fn get_history(&self, script: &Script) -> Result<Vec<HistoryItem>, ElectrumError> {
        self.request("blockchain.scripthash.get_history", vec![json!(scripthash(script))])
            .await
    }

    pub async fn listunspent(&self, script: &Script) -> Result<Vec<Utxo>, ElectrumError> {
        self.request("blockchain.scripthash.listunspent", vec![json!(scripthash(script))])
            .await
    }

    pub async fn get_mempool(&self, script: &Script) -> Result<Vec<HistoryItem>, ElectrumError> {
        self.request("blockchain.scripthash.get_mempool", vec![json!(scripthash(script))])
            .await
    }

    /// Raw 80-byte header at `height`, hex encoded
    pub async fn block_header(&self, height: u32) -> Result<String, ElectrumError> {
        self.request("blockchain.block.header", vec![json!(height)])
            .await
    }

    /// Raw transaction bytes
    pub async fn transaction_get(&self, txid: &Txid) -> Result<Vec<u8>, ElectrumError> {
        let raw: String = self
            .request("blockchain.transaction.get", vec![json!(txid.to_string())])
            .await?;

        hex::decode(raw).map_err(|e| ElectrumError::Server {
            code: 0,
            message: format!("transaction is not hex: {e}"),
        })
    }
}

impl Drop for ElectrumClient {
    fn drop(&mut self) {
        self.ingress_handle.abort();
        self.egress_handle.abort();
    }
}

async fn run_ingress(
    stream: OwnedReadHalf,
    pending: Arc<Pending>,
    notifications: broadcast::Sender<Notification>,
) {
    let mut lines = BufReader::new(stream).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("electrum server closed the connection");
                break;
            }
            Err(e) => {
                warn!("electrum connection failed: {e}");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<Incoming>(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("ignoring unparseable electrum message: {e}");
                continue;
            }
        };

        match (message.id, message.method) {
            (Some(id), _) => {
                let Some(waiter) = pending.take(id) else {
                    trace!(id, "response for a request nobody is waiting on");
                    continue;
                };

                let reply = match message.error {
                    Some(e) => Err(ElectrumError::Server {
                        code: e.code,
                        message: e.message,
                    }),
                    None => Ok(message.result.unwrap_or(Value::Null)),
                };

                let _ = waiter.send(reply);
            }
            (None, Some(method)) => {
                // no subscribers is fine
                let _ = notifications.send(Notification {
                    method,
                    params: message.params,
                });
            }
            (None, None) => trace!("ignoring electrum message without id or method"),
        }
    }

    pending.fail_all();
}

async fn run_egress(
    mut stream: OwnedWriteHalf,
    mut egress_recv: mpsc::Receiver<String>,
    pending: Arc<Pending>,
) {
    while let Some(mut line) = egress_recv.recv().await {
        line.push('\n');

        if let Err(e) = stream.write_all(line.as_bytes()).await {
            warn!("failed writing to electrum server: {e}");
            break;
        }
    }

    pending.fail_all();
}
