//! WebSocket feed for avatar renderers
//!
//! Each connection receives a `connected` message followed by a `snapshot`
//! message whenever the published [`AvatarSnapshot`] changes. Text and binary
//! frames from the client are treated as inbound control payloads.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::session::AvatarSnapshot;

/// Sender identity used when the client doesn't name one
const DEFAULT_PEER_IDENTITY: &str = "renderer";

/// Optional query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
struct WsQuery {
    identity: Option<String>,
}

/// Outgoing WebSocket message to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoing {
    /// Connection established
    Connected { identity: String },
    /// Current avatar state
    Snapshot(AvatarSnapshot),
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/avatar", get(ws_upgrade))
        .with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    query: Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let peer = query
        .0
        .identity
        .unwrap_or_else(|| DEFAULT_PEER_IDENTITY.to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>, peer: String) {
    let (mut sender, mut receiver) = socket.split();

    let connected = WsOutgoing::Connected {
        identity: state.session.identity().to_string(),
    };
    if !send(&mut sender, &connected).await {
        return;
    }

    tracing::info!(peer = %peer, "avatar WebSocket connected");

    let mut snapshots = state.session.subscribe();
    let mut send_task = tokio::spawn(async move {
        loop {
            let snapshot = *snapshots.borrow_and_update();
            if !send(&mut sender, &WsOutgoing::Snapshot(snapshot)).await {
                break;
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    });

    let peer_for_recv = peer.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    state.session.handle_payload(&peer_for_recv, text.as_str().as_bytes());
                }
                Message::Binary(data) => state.session.handle_payload(&peer_for_recv, &data),
                Message::Close(_) => {
                    tracing::info!(peer = %peer_for_recv, "avatar WebSocket closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(peer = %peer, "avatar WebSocket finished");
}

/// Serialize and send one message, returning false once the client is gone
async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &WsOutgoing) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize WebSocket message");
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
