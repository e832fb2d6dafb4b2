// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized message queue (C10) HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::queue::{EnqueueInput, QueueSource, WebChatMeta};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub content: String,
    pub target: String,
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: String,
}

/// `POST /api/v1/queue`
pub async fn enqueue(State(state): State<Arc<AppState>>, Json(req): Json<EnqueueRequest>) -> Json<EnqueueResponse> {
    let id = state
        .queue
        .enqueue(EnqueueInput {
            content: req.content,
            target: req.target,
            source: QueueSource::WebChat { meta: WebChatMeta { conversation_id: req.conversation_id } },
        })
        .await;
    Json(EnqueueResponse { id })
}

/// `GET /api/v1/queue`
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.queue.status())
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// `DELETE /api/v1/queue/{id}`
pub async fn cancel(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Json<CancelResponse> {
    let cancelled = state.queue.cancel(&id).await;
    Json(CancelResponse { cancelled })
}
