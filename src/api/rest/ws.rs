use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::state::AppState;
use crate::transport::TransportFabric;

#[derive(Deserialize)]
pub struct WsQuery {
    /// Comma-separated channel names, e.g. `customer_5,delivery_100`.
    pub channels: String,
}

/// Push side of the dual push+poll design: a client opens one socket
/// multiplexed over all the fabric channels it cares about.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let channels: Vec<String> = query
        .channels
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    ws.on_upgrade(move |socket| handle_socket(socket, state, channels))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, channels: Vec<String>) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.fabric.subscribe(&channels).await;
    let subscription_id = subscription.id;

    info!(?channels, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some((channel, message)) = subscription.recv().await {
            let frame = json!({
                "channel": channel,
                "message": message,
            });

            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "failed to serialize fabric message for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.fabric.unsubscribe(subscription_id).await;
    info!("websocket client disconnected");
}
