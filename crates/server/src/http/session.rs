// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session (C2/C3) and delivery (C6) HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use agentfleet_core::backend::CreateSessionOptions;
use agentfleet_core::command::{self, Key};
use agentfleet_core::delivery::{DeliveryOptions, MAX_DELIVERY_ATTEMPTS};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub cwd: String,
    #[serde(default)]
    pub cols: Option<u16>,
    #[serde(default)]
    pub rows: Option<u16>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub name: String,
    pub cwd: String,
    pub child_pid: u32,
    pub is_killed: bool,
}

/// `POST /api/v1/sessions`
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> ServerResult<Json<SessionView>> {
    let command = req.command.unwrap_or_else(|| vec!["bash".to_string()]);
    let options = CreateSessionOptions {
        cwd: req.cwd.clone(),
        cols: req.cols.unwrap_or(80),
        rows: req.rows.unwrap_or(24),
        ring_capacity: None,
    };
    let session = state.backend.create_session(req.name, &command, options).await?;
    Ok(Json(SessionView {
        name: session.name().to_string(),
        cwd: session.cwd().to_string(),
        child_pid: session.child_pid(),
        is_killed: session.is_killed(),
    }))
}

/// `GET /api/v1/sessions`
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.backend.list_sessions().await;
    Json(
        sessions
            .into_iter()
            .map(|s| SessionView { name: s.name, cwd: s.cwd, child_pid: s.child_pid, is_killed: s.is_killed })
            .collect::<Vec<_>>(),
    )
}

/// `GET /api/v1/sessions/{name}`
pub async fn get_session(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ServerResult<Json<SessionView>> {
    let session = state
        .backend
        .get_session(&name)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("session {name} not found")))?;
    Ok(Json(SessionView {
        name: session.name().to_string(),
        cwd: session.cwd().to_string(),
        child_pid: session.child_pid(),
        is_killed: session.is_killed(),
    }))
}

/// `DELETE /api/v1/sessions/{name}`
pub async fn kill_session(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ServerResult<()> {
    state.backend.kill_session(&name).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CaptureQuery {
    #[serde(default)]
    pub lines: usize,
}

/// `GET /api/v1/sessions/{name}/output`
pub async fn capture_output(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    axum::extract::Query(query): axum::extract::Query<CaptureQuery>,
) -> ServerResult<Json<String>> {
    let output = state.backend.capture_output(&name, query.lines).await?;
    Ok(Json(output))
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub data: String,
}

/// `POST /api/v1/sessions/{name}/write`
pub async fn write(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<WriteRequest>,
) -> ServerResult<()> {
    let session = state
        .backend
        .get_session(&name)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("session {name} not found")))?;
    session.write(Bytes::from(req.data.into_bytes())).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRequest {
    Enter,
    CtrlC,
    CtrlU,
    CtrlL,
    CtrlD,
    Escape,
    Tab,
}

/// `POST /api/v1/sessions/{name}/key`
pub async fn send_key(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<KeyRequest>,
) -> ServerResult<()> {
    let session = state
        .backend
        .get_session(&name)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("session {name} not found")))?;
    let key = match req {
        KeyRequest::Enter => Key::Enter,
        KeyRequest::CtrlC => Key::CtrlC,
        KeyRequest::CtrlU => Key::CtrlU,
        KeyRequest::CtrlL => Key::CtrlL,
        KeyRequest::CtrlD => Key::CtrlD,
        KeyRequest::Escape => Key::Escape,
        KeyRequest::Tab => Key::Tab,
    };
    command::send_key(&session, key).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    pub cols: u16,
    pub rows: u16,
}

/// `POST /api/v1/sessions/{name}/resize`
pub async fn resize(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<ResizeRequest>,
) -> ServerResult<()> {
    let session = state
        .backend
        .get_session(&name)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("session {name} not found")))?;
    session.resize(req.cols, req.rows).await?;
    Ok(())
}

fn default_max_attempts() -> u32 {
    MAX_DELIVERY_ATTEMPTS
}

#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    pub message: String,
    pub prompt_pattern: String,
    pub confirmation_pattern: String,
    #[serde(default)]
    pub clear_line_first: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Serialize)]
pub struct DeliverResponse {
    pub delivered: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/v1/sessions/{name}/deliver`. A timeout is reported as a
/// success envelope with `delivered: false`, per spec.md §7.
pub async fn deliver(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<DeliverRequest>,
) -> ServerResult<Json<DeliverResponse>> {
    let options = DeliveryOptions {
        prompt_pattern: req.prompt_pattern,
        confirmation_pattern: req.confirmation_pattern,
        clear_line_first: req.clear_line_first,
        max_attempts: req.max_attempts,
    };
    match state.delivery.deliver(&state.backend, &name, &req.message, &options).await {
        Ok(attempts) => Ok(Json(DeliverResponse { delivered: true, attempts, error: None })),
        Err(failure) if failure.is_terminal() => Err(ServerError::NotFound(format!("session {name} not found"))),
        Err(failure) => Ok(Json(DeliverResponse { delivered: false, attempts: 0, error: Some(failure.to_string()) })),
    }
}
