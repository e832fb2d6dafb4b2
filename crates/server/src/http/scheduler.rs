// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler (C11) HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::scheduler::{JobAction, ScheduleParams};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Check,
    Recurring,
    Continuation,
    Adaptive,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub kind: ScheduleKind,
    pub session: String,
    pub target: String,
    pub content: String,
    pub delay_seconds: u64,
    #[serde(default)]
    pub direct_write: bool,
    #[serde(default)]
    pub max_occurrences: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub id: String,
}

/// `POST /api/v1/scheduler`
pub async fn schedule(State(state): State<Arc<AppState>>, Json(req): Json<ScheduleRequest>) -> Json<ScheduleResponse> {
    let action = if req.direct_write {
        JobAction::DirectWrite { target: req.target, content: req.content }
    } else {
        JobAction::Enqueue { target: req.target, content: req.content }
    };
    let params = ScheduleParams {
        session: req.session,
        action,
        delay: Duration::from_secs(req.delay_seconds),
        max_occurrences: req.max_occurrences,
    };
    let id = match req.kind {
        ScheduleKind::Check => state.scheduler.schedule_check(params),
        ScheduleKind::Recurring => state.scheduler.schedule_recurring(params),
        ScheduleKind::Continuation => state.scheduler.schedule_continuation(params),
        ScheduleKind::Adaptive => state.scheduler.schedule_adaptive(params),
    };
    Json(ScheduleResponse { id })
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// `DELETE /api/v1/scheduler/{id}`
pub async fn cancel(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Json<CancelResponse> {
    Json(CancelResponse { cancelled: state.scheduler.cancel(&id) })
}

#[derive(Debug, Serialize)]
pub struct CancelAllResponse {
    pub cancelled: usize,
}

/// `DELETE /api/v1/scheduler/session/{session}`
pub async fn cancel_all_for(State(state): State<Arc<AppState>>, Path(session): Path<String>) -> Json<CancelAllResponse> {
    Json(CancelAllResponse { cancelled: state.scheduler.cancel_all_for(&session) })
}

/// `GET /api/v1/scheduler/stats`
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.get_stats())
}
