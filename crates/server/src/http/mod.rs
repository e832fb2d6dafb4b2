// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin axum surface over the core operations spec.md §6 names. Each
//! submodule owns one resource, matching the teacher's
//! `crates/cli/src/transport/http/*` layout (`agent.rs`, `screen.rs`, ...).
//! Every handler deserializes, calls a core/state method, serializes —
//! no business logic lives here.

pub mod agent;
pub mod auth;
pub mod queue;
pub mod scheduler;
pub mod session;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;
use crate::ws;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/ws/sessions/{name}", get(ws::session_ws))
        .route("/ws/conversations/{conversation_id}", get(ws::conversation_ws))
        .route("/api/v1/sessions", get(session::list_sessions).post(session::create_session))
        .route("/api/v1/sessions/{name}", get(session::get_session).delete(session::kill_session))
        .route("/api/v1/sessions/{name}/output", get(session::capture_output))
        .route("/api/v1/sessions/{name}/write", post(session::write))
        .route("/api/v1/sessions/{name}/key", post(session::send_key))
        .route("/api/v1/sessions/{name}/resize", post(session::resize))
        .route("/api/v1/sessions/{name}/deliver", post(session::deliver))
        .route("/api/v1/agents", get(agent::list_agents).post(agent::register_agent))
        .route("/api/v1/agents/{key}/session", post(agent::create_agent_session))
        .route("/api/v1/agents/{key}/suspend", post(agent::suspend))
        .route("/api/v1/agents/{key}/rehydrate", post(agent::rehydrate))
        .route("/api/v1/queue", get(queue::status).post(queue::enqueue))
        .route("/api/v1/queue/{id}", delete(queue::cancel))
        .route("/api/v1/scheduler", post(scheduler::schedule))
        .route("/api/v1/scheduler/stats", get(scheduler::get_stats))
        .route("/api/v1/scheduler/{id}", delete(scheduler::cancel))
        .route("/api/v1/scheduler/session/{session}", delete(scheduler::cancel_all_for))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
