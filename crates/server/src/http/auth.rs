// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer token authentication middleware, grounded on
//! `crates/mux/src/transport/auth.rs` near-verbatim.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{ErrorBody, ErrorResponse};
use crate::state::AppState;

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else { return true };
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(token) = header.strip_prefix("Bearer ") else { return false };
    constant_time_eq(token, expected)
}

/// Exempt: `/healthz` and WebSocket upgrades (`/ws/`).
pub async fn auth_layer(state: State<Arc<AppState>>, req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/healthz" || path.starts_with("/ws/") {
        return next.run(req).await;
    }

    if !validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        let body = ErrorResponse { error: ErrorBody { code: "UNAUTHORIZED".to_string(), message: "missing or invalid bearer token".to_string() } };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    next.run(req).await
}
