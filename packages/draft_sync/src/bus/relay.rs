//! In-process Sync Bus relay.
//!
//! A loopback WebSocket server that fans every text frame a client sends out
//! to every *other* connected client. Frames are never parsed here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, Utf8Bytes, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Path clients connect to.
pub const SYNC_PATH: &str = "/sync";

const RELAY_CHANNEL_CAPACITY: usize = 256;

/// A frame in flight through the relay, tagged with its sender.
#[derive(Clone, Debug)]
struct RelayFrame {
    from: Arc<str>,
    text: Utf8Bytes,
}

#[derive(Clone)]
struct RelayState {
    frames: broadcast::Sender<RelayFrame>,
    connected: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

/// Handle to a running relay.
pub struct SyncRelay {
    addr: SocketAddr,
    connected: Arc<AtomicUsize>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncRelay {
    /// Bind and start serving. Use port 0 to pick a free port.
    pub async fn start(bind_addr: SocketAddr) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind sync relay on {}", bind_addr))?;
        let addr = listener
            .local_addr()
            .context("sync relay has no local address")?;

        let (frames, _) = broadcast::channel(RELAY_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let state = RelayState {
            frames,
            connected: connected.clone(),
            cancel: cancel.clone(),
        };

        let app = Router::new()
            .route(SYNC_PATH, get(sync_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                warn!("Sync relay stopped with error: {}", e);
            }
        });

        info!("Sync relay listening at ws://{}{}", addr, SYNC_PATH);

        Ok(Self {
            addr,
            connected,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// WebSocket URL for clients.
    pub fn url(&self) -> String {
        format!("ws://{}{}", self.addr, SYNC_PATH)
    }

    pub fn connected_clients(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }

    /// Close every client connection and stop listening.
    pub async fn shutdown(self) {
        info!("Shutting down sync relay");
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn health_handler(State(state): State<RelayState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "clients": state.connected.load(Ordering::Relaxed),
    }))
}

async fn sync_handler(State(state): State<RelayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_client(socket, state))
}

async fn handle_client(socket: WebSocket, state: RelayState) {
    let connection_id: Arc<str> = uuid::Uuid::new_v4().to_string().into();
    // Subscribe before reading anything so replies to this client's first
    // frame can't be missed.
    let mut frames_rx = state.frames.subscribe();
    let clients = state.connected.fetch_add(1, Ordering::Relaxed) + 1;
    info!(conn_id = %connection_id, clients, "Sync client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
            frame = frames_rx.recv() => {
                match frame {
                    Ok(frame) => {
                        if frame.from == connection_id {
                            continue;
                        }
                        if ws_sender.send(Message::Text(frame.text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(conn_id = %connection_id, "Relay lagged, dropped {} frames", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // No other receivers is fine; the frame is simply dropped.
                        let _ = state.frames.send(RelayFrame {
                            from: connection_id.clone(),
                            text,
                        });
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(conn_id = %connection_id, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(conn_id = %connection_id, "Sync client read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let clients = state.connected.fetch_sub(1, Ordering::Relaxed) - 1;
    info!(conn_id = %connection_id, clients, "Sync client disconnected");
}
