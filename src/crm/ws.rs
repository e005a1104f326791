use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::api::SharedState;
use super::models::FeedItem;
use super::session::CurrentUser;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the live event channel.
pub const CHANNEL_CAPACITY: usize = 256;

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    NotificationCreated { notification: FeedItem },
    NotificationsRead { ids: Vec<i64>, all: bool },
}

/// A serialized message addressed to one user.
#[derive(Debug, Clone)]
pub struct LiveEvent {
    pub user_id: i64,
    pub payload: String,
}

impl LiveEvent {
    /// Payload if this event is meant for `user_id`.
    fn payload_for(&self, user_id: i64) -> Option<&str> {
        (self.user_id == user_id).then_some(self.payload.as_str())
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

/// Upgrade to a socket carrying the caller's live events. The session is
/// checked before the upgrade.
pub async fn ws_handler(
    user: CurrentUser,
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = state.live_tx.subscribe();
    let user_id = user.viewer.user_id;
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, rx))
}

async fn handle_socket(socket: WebSocket, user_id: i64, rx: broadcast::Receiver<LiveEvent>) {
    debug!(user_id, "WebSocket connected");
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, rx, user_id).await;
    debug!(user_id, "WebSocket closed");
}

/// Forward the caller's events and keep the connection alive with
/// ping/pong. If no Pong arrives within [`PONG_TIMEOUT`] after a Ping, the
/// connection is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<LiveEvent>,
    user_id: i64,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Some(payload) = event.payload_for(user_id) {
                            if sender.send(Message::Text(payload.to_owned().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(user_id, skipped, "WebSocket client lagged behind");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Publish helper ───────────────────────────────────────────────────

/// Serialize `msg` and send it to the sockets of `user_id`. Having no
/// connected sockets is not an error.
pub fn publish(tx: &broadcast::Sender<LiveEvent>, user_id: i64, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(payload) => {
            let _ = tx.send(LiveEvent { user_id, payload });
        }
        Err(e) => {
            warn!(error = %e, "Failed to serialize WsMessage");
        }
    }
}
