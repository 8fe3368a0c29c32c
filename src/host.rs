//! Transport host: publishes the tool-provider exchange over HTTP/SSE.
//!
//! Alternate entry point: no REPL, no conversation state. A remote
//! orchestration client connects with `GET /sse`, receives an `endpoint`
//! event naming its message URL, then POSTs JSON-RPC lines there; everything
//! the provider writes streams back as `message` events. Each connection
//! gets its own provider subprocess, torn down when the stream drops.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::LinesStream, Stream, StreamExt};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::{Credentials, ProviderConfig};
use crate::provider::process::ProviderProcess;

type SessionMap = Arc<Mutex<HashMap<Uuid, mpsc::Sender<String>>>>;

#[derive(Clone)]
struct HostState {
    provider: ProviderConfig,
    sessions: SessionMap,
}

/// Entry point for `tastychat serve`.
///
/// Validates credentials before binding anything; a missing credential is a
/// descriptive error and a non-zero exit, with no partial startup.
pub fn run_serve(host: String, port: u16) -> Result<()> {
    let credentials = Credentials::from_env();
    if let Err(e) = credentials.validate() {
        tracing::error!("Missing required environment variables!");
        tracing::error!("Please set TASTYTRADE_CLIENT_SECRET and TASTYTRADE_REFRESH_TOKEN");
        return Err(e.into());
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(serve(host, port))
}

async fn serve(host: String, port: u16) -> Result<()> {
    let state = HostState {
        provider: ProviderConfig::from_env(),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Starting tool server host with HTTP/SSE transport...");
    tracing::info!("Endpoint: http://{}/sse", addr);
    tracing::info!("Connect your orchestration client to the endpoint above");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn router(state: HostState) -> Router {
    Router::new()
        .route("/sse", get(sse_handler))
        .route("/messages", post(messages_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Removes the session registration and (via `kill_on_drop`) the provider
/// subprocess when the SSE stream is dropped.
struct SessionGuard {
    id: Uuid,
    sessions: SessionMap,
    _process: ProviderProcess,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&self.id);
        }
        tracing::info!(session_id = %self.id, "remote client disconnected");
    }
}

async fn sse_handler(
    State(state): State<HostState>,
) -> Result<Sse<impl Stream<Item = Result<Event, io::Error>>>, (StatusCode, String)> {
    let mut process = ProviderProcess::spawn(&state.provider)
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    let (mut stdin, stdout) = process
        .take_io()
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<String>(32);
    state
        .sessions
        .lock()
        .expect("session map poisoned")
        .insert(session_id, tx);
    tracing::info!(session_id = %session_id, "remote client connected");

    // Inbound pump: POSTed JSON-RPC lines → provider stdin. Ends when the
    // guard drops the sender out of the session map.
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if stdin.write_all(line.as_bytes()).await.is_err()
                || stdin.write_all(b"\n").await.is_err()
                || stdin.flush().await.is_err()
            {
                break;
            }
        }
    });

    let guard = SessionGuard {
        id: session_id,
        sessions: Arc::clone(&state.sessions),
        _process: process,
    };

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={}", session_id));
    let outbound = LinesStream::new(BufReader::new(stdout).lines()).map(move |line| {
        let _keepalive = &guard;
        line.map(|l| Event::default().event("message").data(l))
    });
    let stream = tokio_stream::once(Ok::<Event, io::Error>(endpoint)).chain(outbound);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: Uuid,
}

async fn messages_handler(
    State(state): State<HostState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> StatusCode {
    let tx = {
        let sessions = state.sessions.lock().expect("session map poisoned");
        sessions.get(&query.session_id).cloned()
    };
    match tx {
        Some(tx) => {
            if tx.send(body).await.is_ok() {
                StatusCode::ACCEPTED
            } else {
                // Session is tearing down; its subprocess is already gone.
                StatusCode::BAD_GATEWAY
            }
        }
        None => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> HostState {
        HostState {
            provider: ProviderConfig {
                command: "cat".to_string(),
                args: Vec::new(),
                startup_timeout: Duration::from_secs(5),
            },
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[tokio::test]
    async fn posting_to_an_unknown_session_is_not_found() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/messages?session_id={}", Uuid::new_v4()))
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn posting_without_a_session_id_is_rejected() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/messages")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn registered_sessions_accept_messages() {
        let state = test_state();
        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel::<String>(4);
        state.sessions.lock().unwrap().insert(session_id, tx);

        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/messages?session_id={}", session_id))
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let forwarded = rx.recv().await.unwrap();
        assert!(forwarded.contains("\"method\":\"ping\""));
    }
}
