//! services/api/src/web/ws_handler.rs
//!
//! This is the entry point for a player WebSocket connection. It bridges the
//! socket to the `player_process` task through a pair of channels and tears the
//! task down when the socket goes away.

use crate::web::{
    player_task::player_process,
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Messages buffered in each direction before the sender waits.
const CHANNEL_CAPACITY: usize = 64;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New player connection established for user: {}", user_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(CHANNEL_CAPACITY);
    let cancellation_token = CancellationToken::new();

    // --- 1. Player Task ---
    let player_handle = tokio::spawn(player_process(
        app_state.player.clone(),
        inbound_rx,
        outbound_tx,
        cancellation_token.clone(),
    ));

    // --- 2. Writer Task ---
    let writer_token = cancellation_token.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize player message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                warn!("Failed to send player message. Closing connection.");
                writer_token.cancel();
                break;
            }
        }
    });

    // --- 3. Reader Loop ---
    loop {
        let frame = tokio::select! {
            _ = cancellation_token.cancelled() => break,
            frame = ws_receiver.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if inbound_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to deserialize client message: {}", e),
            },
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("Player connection error: {}", e);
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    cancellation_token.cancel();
    drop(inbound_tx);
    if let Err(e) = player_handle.await {
        error!("Player task join error: {:?}", e);
    }
    writer_handle.abort();
    info!("Player connection closed for user: {}", user_id);
}
