// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket surface: per-session PTY output streaming and per-conversation
//! web-chat response delivery, grounded on
//! `crates/mux/src/transport/ws.rs`'s select-loop-over-bridge shape.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// `GET /ws/sessions/{name}` — streams a session's raw PTY output as it
/// arrives; client writes are forwarded to the PTY as input bytes.
pub async fn session_ws(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(session) = state.backend.get_session(&name).await else {
        return axum::http::Response::builder()
            .status(404)
            .body(axum::body::Body::from("session not found"))
            .unwrap_or_default()
            .into_response();
    };

    ws.on_upgrade(move |socket| handle_session_ws(socket, session)).into_response()
}

async fn handle_session_ws(socket: WebSocket, session: Arc<agentfleet_core::session::PtySession>) {
    let (tx, mut rx) = mpsc::channel(256);
    let listener_id = match session.on_data(tx) {
        Ok(id) => id,
        Err(_) => return,
    };
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            chunk = rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        if ws_tx.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let _ = session.write(data).await;
                    }
                    Some(Ok(Message::Text(text))) => {
                        let _ = session.write(bytes::Bytes::from(text.to_string().into_bytes())).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    session.off_data(listener_id);
}

/// `GET /ws/conversations/{conversation_id}` — streams [`crate::routing::DeliveryOutcome`]s
/// routed to a `web_chat` conversation as its queued messages complete.
pub async fn conversation_ws(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_conversation_ws(socket, state, conversation_id))
}

async fn handle_conversation_ws(socket: WebSocket, state: Arc<AppState>, conversation_id: String) {
    let mut rx = state.ws_gateway.subscribe(&conversation_id);
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            outcome = rx.recv() => {
                match outcome {
                    Ok(outcome) => {
                        let Ok(payload) = serde_json::to_string(&SerializableOutcome::from(&outcome)) else { continue };
                        if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

#[derive(serde::Serialize)]
struct SerializableOutcome {
    delivered: bool,
    response: Option<String>,
    error: Option<String>,
}

impl From<&crate::routing::DeliveryOutcome> for SerializableOutcome {
    fn from(outcome: &crate::routing::DeliveryOutcome) -> Self {
        Self { delivered: outcome.delivered, response: outcome.response.clone(), error: outcome.error.clone() }
    }
}
