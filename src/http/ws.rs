//! WebSocket transport for the realtime surface
//!
//! One task per socket reads inbound frames and drives the session manager;
//! a forwarder task drains the connection's outbound queue into the socket.

use crate::http::routes::HttpState;
use crate::types::ClientEvent;
use crate::utils::generate_connection_id;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

pub async fn ws_handler(State(state): State<HttpState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_ws_session(socket, state))
}

/// Decode one inbound text frame
pub fn parse_client_frame(text: &str) -> serde_json::Result<ClientEvent> {
    serde_json::from_str(text)
}

/// Run a realtime session from upgrade through disconnect
pub async fn run_ws_session(socket: WebSocket, state: HttpState) {
    let connection_id = generate_connection_id();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Queue first, so the greeting from `connect` has somewhere to go
    let mut outbound_rx = state
        .hub
        .register(connection_id, state.outbound_queue_size)
        .await;
    state.manager.connect(connection_id).await;

    let outbound = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_tx
                .send(Message::Text(String::clone(&frame).into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    debug!("Ignoring non-UTF8 binary frame from {}", connection_id);
                    continue;
                }
            },
            Message::Close(_) => {
                info!("Connection {} sent close frame", connection_id);
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match parse_client_frame(&text) {
            Ok(event) => state.manager.handle_event(connection_id, event).await,
            Err(e) => {
                warn!("Malformed frame from {}: {}", connection_id, e);
                state
                    .manager
                    .send_error(connection_id, format!("Invalid event: {}", e))
                    .await;
            }
        }
    }

    if let Err(e) = state.manager.disconnect(connection_id).await {
        warn!("Disconnect cleanup for {} failed: {}", connection_id, e);
    }
    state.hub.unregister(connection_id).await;
    outbound.abort();
}
