// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry (C7), member session creation, and suspend/rehydrate
//! (C8) HTTP handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use agentfleet_core::agent::registry::ResumeToken;
use agentfleet_core::agent::{AgentIdentity, AgentRecord, AgentRole};
use agentfleet_core::runtime::{GenericRuntimeAdapter, RuntimeType};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub team_id: String,
    pub member_id: String,
    pub role: String,
    pub runtime_type: String,
}

/// `POST /api/v1/agents`
pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterAgentRequest>,
) -> ServerResult<Json<AgentRecord>> {
    let role = match req.role.as_str() {
        "orchestrator" => AgentRole::Orchestrator,
        "member" => AgentRole::Member,
        other => return Err(ServerError::BadRequest(format!("unknown role: {other}"))),
    };
    let runtime_type = RuntimeType::parse(&req.runtime_type)?;
    let identity = AgentIdentity { team_id: req.team_id, member_id: req.member_id, role };
    let record = state.registry.register(identity, runtime_type);
    Ok(Json(record))
}

/// `GET /api/v1/agents`
pub async fn list_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.list())
}

#[derive(Debug, Serialize)]
pub struct SuspendResponse {
    pub suspended: bool,
}

/// `POST /api/v1/agents/{key}/suspend`. `suspended: false` covers both an
/// already-suspended agent (Invariant 5's idempotent no-op) and the
/// orchestrator-forbidden case (S4).
pub async fn suspend(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> ServerResult<Json<SuspendResponse>> {
    let resume_token = ResumeToken(uuid::Uuid::new_v4().to_string());
    match agentfleet_core::agent::lifecycle::suspend(&state.registry, &state.backend, &key, resume_token).await {
        Ok(newly_suspended) => Ok(Json(SuspendResponse { suspended: newly_suspended })),
        Err(e) if e.kind() == "failed_precondition" => Ok(Json(SuspendResponse { suspended: false })),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentSessionRequest {
    pub session_name: String,
    pub cwd: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAgentSessionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/v1/agents/{key}/session`: `createAgentSession`. Drives a
/// freshly-registered member from `inactive` to `active` by starting its
/// runtime; a 404 covers an unknown key, while a runtime start failure is
/// reported as a success envelope with `success: false`.
pub async fn create_agent_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<CreateAgentSessionRequest>,
) -> ServerResult<Json<CreateAgentSessionResponse>> {
    let record = state.registry.get(&key).ok_or_else(|| ServerError::NotFound(format!("agent {key} not found")))?;
    let adapter = GenericRuntimeAdapter::new(record.runtime_type);
    match agentfleet_core::agent::lifecycle::create_agent_session(
        &state.registry,
        &state.backend,
        &adapter,
        &key,
        req.session_name,
        req.cwd,
    )
    .await
    {
        Ok(_) => Ok(Json(CreateAgentSessionResponse { success: true, error: None })),
        Err(e) => Ok(Json(CreateAgentSessionResponse { success: false, error: Some(e.to_string()) })),
    }
}

#[derive(Debug, Deserialize)]
pub struct RehydrateRequest {
    pub session_name: String,
    pub cwd: String,
}

/// `POST /api/v1/agents/{key}/rehydrate`
pub async fn rehydrate(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<RehydrateRequest>,
) -> ServerResult<Json<AgentRecord>> {
    let record = state.registry.get(&key).ok_or_else(|| ServerError::NotFound(format!("agent {key} not found")))?;
    let adapter = GenericRuntimeAdapter::new(record.runtime_type);
    let record = state
        .rehydrate
        .rehydrate(&state.registry, &state.backend, &adapter, &key, req.session_name, req.cwd)
        .await?;
    Ok(Json(record))
}
