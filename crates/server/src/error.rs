// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-facing error taxonomy. Grounded on the teacher's
//! `ErrorCode::http_status` match (`crates/cli/src/error.rs`), extended
//! with the kinds spec.md §7 names that the teacher's table lacks.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agentfleet_core::error::CoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("busy: {0}")]
    Busy(String),
    #[error("timeout exceeded: {0}")]
    TimeoutExceeded(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Busy(_) => "BUSY",
            Self::TimeoutExceeded(_) => "TIMEOUT_EXCEEDED",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition(_) => "FAILED_PRECONDITION",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::Busy(_) => StatusCode::CONFLICT,
            Self::TimeoutExceeded(_) => StatusCode::OK,
            Self::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `CoreError` converts straight across: spec §7 says the HTTP layer maps
/// NotFound/AlreadyExists to 404/409, Busy to 409, TimeoutExceeded to a
/// success envelope with `delivered: false` — the latter is handled by
/// callers that catch `TimeoutExceeded` before it reaches this conversion;
/// if it does reach here, it still renders as a (non-error) 200.
impl From<CoreError> for ServerError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound(m) => Self::NotFound(m),
            CoreError::AlreadyExists(m) => Self::AlreadyExists(m),
            CoreError::Busy(m) => Self::Busy(m),
            CoreError::TimeoutExceeded(m) => Self::TimeoutExceeded(m),
            CoreError::ResourceExhausted(m) => Self::ResourceExhausted(m),
            CoreError::FailedPrecondition(m) => Self::FailedPrecondition(m),
            CoreError::Internal(m) => Self::Internal(m),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = ErrorResponse { error: ErrorBody { code: self.code().to_string(), message: self.to_string() } };
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
