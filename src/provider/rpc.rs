//! JSON-RPC 2.0 client core: line-delimited frames over a byte stream.
//!
//! One request → one response, matched by id; notifications are fire-and-
//! forget. The peer is normally the tool-server subprocess's stdio pipe, but
//! the core is generic over reader/writer so the protocol can be exercised
//! in-memory.
//!
//! A transport failure (peer gone, pipe closed) is a different animal from a
//! JSON-RPC error response (peer alive, request rejected); callers get the
//! two as distinct variants and map them to their own policy.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};

/// Outcome of a request that did not produce a `result`.
#[derive(Debug)]
pub enum RpcFailure {
    /// The channel to the peer is gone; no further requests will succeed.
    Transport(String),
    /// The peer answered with a JSON-RPC error object.
    Remote { code: i64, message: String },
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcFailure::Transport(msg) => write!(f, "transport failure: {}", msg),
            RpcFailure::Remote { code, message } => {
                write!(f, "rpc error {}: {}", code, message)
            }
        }
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcFailure>>>>>;

/// JSON-RPC client over a line-delimited byte stream.
///
/// Spawns a writer task (serializes outbound frames) and a reader task
/// (routes responses to their waiting requests). Both tasks end when the
/// peer closes or the client is dropped.
pub struct RpcClient {
    outbound: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl RpcClient {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, mut outbound_rx) = mpsc::channel::<String>(32);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let mut writer = writer;
        tokio::spawn(async move {
            while let Some(line) = outbound_rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if writer.write_all(b"\n").await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = Arc::clone(&closed);
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Value>(line) {
                            Ok(frame) => route_frame(&reader_pending, frame).await,
                            Err(e) => {
                                tracing::debug!("discarding non-JSON line from provider: {}", e);
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            // Peer closed: every in-flight request fails as a transport
            // loss, and the closed flag keeps later requests from parking
            // in a map nobody will drain again.
            reader_closed.store(true, Ordering::SeqCst);
            let mut map = reader_pending.lock().await;
            for (_, tx) in map.drain() {
                let _ = tx.send(Err(RpcFailure::Transport(
                    "provider stream closed".to_string(),
                )));
            }
        });

        Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            closed,
        }
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.outbound.send(frame.to_string()).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(RpcFailure::Transport("provider stdin closed".to_string()));
        }

        // If the peer went away before this entry was registered, the
        // drain already ran; reclaim the entry instead of waiting on it.
        if self.closed.load(Ordering::SeqCst)
            && self.pending.lock().await.remove(&id).is_some()
        {
            return Err(RpcFailure::Transport("provider stream closed".to_string()));
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RpcFailure::Transport("provider stream closed".to_string())),
        }
    }

    /// Send a notification (no id, no response).
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), RpcFailure> {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.outbound
            .send(frame.to_string())
            .await
            .map_err(|_| RpcFailure::Transport("provider stdin closed".to_string()))
    }
}

/// Deliver one inbound frame to whoever is waiting on it.
async fn route_frame(pending: &Pending, frame: Value) {
    let Some(id) = frame.get("id").and_then(|v| v.as_u64()) else {
        // Server-initiated notification (log message, progress); not part of
        // the request/response contract.
        tracing::debug!(
            method = frame.get("method").and_then(|m| m.as_str()).unwrap_or("?"),
            "ignoring unsolicited provider frame"
        );
        return;
    };

    let Some(tx) = pending.lock().await.remove(&id) else {
        tracing::debug!(id, "response for unknown request id");
        return;
    };

    let outcome = if let Some(err) = frame.get("error") {
        Err(RpcFailure::Remote {
            code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(-32603),
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        })
    } else {
        Ok(frame.get("result").cloned().unwrap_or(Value::Null))
    };
    let _ = tx.send(outcome);
}
