//! Sync Bus client
//!
//! Keeps one WebSocket connection to the relay alive for the lifetime of the
//! window. Every (re)connect starts with `REQUEST_SYNC` so the window catches
//! up with its peers, and the request is repeated every `resync_interval` so
//! frames the relay dropped are eventually recovered. A lost connection is retried at a fixed interval and is
//! never fatal: callers keep working locally and only see [`BusStatus`] flip.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::SyncMessage;
use crate::config::BusConfig;
use crate::error::BusError;
use crate::timer::Timer;

/// Connection state, surfaced to the UI as an "out of sync" indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl BusStatus {
    pub fn is_in_sync(&self) -> bool {
        matches!(self, BusStatus::Connected)
    }
}

/// The window's end of the bus.
pub struct BusHandle {
    /// Messages to publish. Dropped (not queued) while disconnected.
    pub outbound: mpsc::Sender<SyncMessage>,
    /// Messages received from peers.
    pub inbound: mpsc::Receiver<SyncMessage>,
    pub status: watch::Receiver<BusStatus>,
    pub task: JoinHandle<()>,
}

/// Why a connected session ended.
enum SessionEnd {
    Cancelled,
    Lost,
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct BusClient;

impl BusClient {
    /// Spawn the connection loop. It runs until `cancel` fires.
    pub fn spawn(config: BusConfig, timer: Arc<dyn Timer>, cancel: CancellationToken) -> BusHandle {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        let (status_tx, status_rx) = watch::channel(BusStatus::Connecting);

        let task = tokio::spawn(run_client(
            config,
            timer,
            cancel,
            outbound_rx,
            inbound_tx,
            status_tx,
        ));

        BusHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
            status: status_rx,
            task,
        }
    }
}

async fn run_client(
    config: BusConfig,
    timer: Arc<dyn Timer>,
    cancel: CancellationToken,
    mut outbound_rx: mpsc::Receiver<SyncMessage>,
    inbound_tx: mpsc::Sender<SyncMessage>,
    status_tx: watch::Sender<BusStatus>,
) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        status_tx.send_replace(BusStatus::Connecting);
        debug!(url = %config.url, attempt, "Connecting to sync bus");

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
        };

        match connected {
            Ok((ws, _)) => {
                info!(url = %config.url, "Connected to sync bus");
                attempt = 0;
                status_tx.send_replace(BusStatus::Connected);
                let end = run_session(
                    ws,
                    timer.as_ref(),
                    config.resync_interval,
                    &cancel,
                    &mut outbound_rx,
                    &inbound_tx,
                )
                .await;
                status_tx.send_replace(BusStatus::Disconnected);
                if matches!(end, SessionEnd::Cancelled) {
                    break;
                }
                warn!(url = %config.url, "Lost sync bus connection, working locally");
            }
            Err(e) => {
                let e = BusError::from(e);
                status_tx.send_replace(BusStatus::Disconnected);
                if attempt == 1 {
                    warn!(url = %config.url, "Sync bus unavailable: {}", e);
                } else {
                    debug!(url = %config.url, attempt, "Sync bus still unavailable: {}", e);
                }
            }
        }

        if !backoff(timer.as_ref(), config.reconnect_interval, &cancel, &mut outbound_rx).await {
            break;
        }
    }

    status_tx.send_replace(BusStatus::Disconnected);
    debug!("Sync bus client stopped");
}

/// Wait out the reconnect interval, discarding anything published meanwhile
/// so publishers never block. Returns false if cancelled.
async fn backoff(
    timer: &dyn Timer,
    interval: Duration,
    cancel: &CancellationToken,
    outbound_rx: &mut mpsc::Receiver<SyncMessage>,
) -> bool {
    let sleep = timer.sleep(interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = &mut sleep => return true,
            msg = outbound_rx.recv() => match msg {
                Some(msg) => debug!(kind = msg.kind(), "Dropping message while disconnected"),
                None => return false,
            },
        }
    }
}

fn resync_timer(timer: &dyn Timer, interval: Option<Duration>) -> BoxFuture<'static, ()> {
    match interval {
        Some(interval) => timer.sleep(interval),
        None => Box::pin(std::future::pending()),
    }
}

async fn run_session(
    ws: WsStream,
    timer: &dyn Timer,
    resync_interval: Option<Duration>,
    cancel: &CancellationToken,
    outbound_rx: &mut mpsc::Receiver<SyncMessage>,
    inbound_tx: &mpsc::Sender<SyncMessage>,
) -> SessionEnd {
    let (mut ws_write, mut ws_read) = ws.split();

    if send(&mut ws_write, &SyncMessage::RequestSync).await.is_err() {
        return SessionEnd::Lost;
    }
    let mut resync = resync_timer(timer, resync_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_write.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            _ = &mut resync => {
                debug!("Re-requesting sync");
                if send(&mut ws_write, &SyncMessage::RequestSync).await.is_err() {
                    return SessionEnd::Lost;
                }
                resync = resync_timer(timer, resync_interval);
            }
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else {
                    return SessionEnd::Cancelled;
                };
                if send(&mut ws_write, &msg).await.is_err() {
                    return SessionEnd::Lost;
                }
            }
            frame = ws_read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match SyncMessage::decode(&text) {
                        Ok(msg) => {
                            if inbound_tx.send(msg).await.is_err() {
                                return SessionEnd::Cancelled;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed sync frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Sync bus read error: {}", e);
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }
}

async fn send<S>(ws_write: &mut S, msg: &SyncMessage) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match msg.encode() {
        Ok(json) => json,
        Err(e) => {
            warn!("{}", e);
            // Unencodable messages are skipped, not fatal to the connection.
            return Ok(());
        }
    };
    ws_write.send(Message::Text(json.into())).await.map_err(|e| {
        debug!(kind = msg.kind(), "Sync bus write failed: {}", e);
    })
}
