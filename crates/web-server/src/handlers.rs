use crate::{error::AppError, AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use core_types::{signal_collection_key, Signal};
use database::WatchSymbol;
use events::WsMessage;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ws_clients: usize,
}

/// # GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        ws_clients: state.broadcaster.subscriber_count(),
    })
}

/// # GET /api/watch-symbols
pub async fn get_watch_symbols(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WatchSymbol>>, AppError> {
    let symbols = state.db_repo.list_watch_symbols().await?;
    Ok(Json(symbols))
}

/// # GET /api/signals/:symbol
/// The stored signal history of one symbol, oldest bar first.
pub async fn get_signals(
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Signal>>, AppError> {
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidSymbol(symbol));
    }
    let signals = state.db_repo.get_signals(&signal_collection_key(&symbol)).await?;
    Ok(Json(signals))
}

/// # GET /ws
/// Streams every pipeline broadcast to the client as JSON.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>, // State must come before WebSocketUpgrade
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Subscribe before greeting so nothing emitted after `Connected` is missed.
    let mut signals = state.broadcaster.subscribe();
    let (mut sender, mut receiver) = socket.split();
    tracing::info!("[WS] New client connected.");

    if !send_json(&mut sender, &WsMessage::Connected).await {
        return;
    }

    loop {
        tokio::select! {
            message = signals.recv() => match message {
                Ok(message) => {
                    if !send_json(&mut sender, &message).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "[WS] Client fell behind; dropped broadcasts.");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("[WS] Client disconnected.");
                    break;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "[WS] Error.");
                    break;
                }
                // Clients have nothing to say; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!("[WS] Connection closed.");
}

/// Returns `false` once the client can no longer be written to.
async fn send_json<S>(sender: &mut S, message: &WsMessage) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match message.to_json() {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "[WS] Failed to serialize message.");
            true
        }
    }
}
