// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified error taxonomy shared by every core component.
//!
//! Mirrors the error kinds named in the orchestrator design doc: each
//! component that can fail reports one of these variants rather than an
//! opaque string, so callers (HTTP layer, queue worker, scheduler) can
//! branch on `kind()` without string matching.

use thiserror::Error;

/// Errors raised by core components (session backend, delivery, agent
/// registry, atomic store, ...).
#[derive(Debug, Error)]
pub enum CoreError {
    /// A session, queued item, or scheduled job was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A session name was reused before its prior occupant finished dying.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Another operation is already in progress (restart, rehydrate, reconciliation).
    #[error("busy: {0}")]
    Busy(String),

    /// A prompt or confirmation was not observed within budget.
    #[error("timeout exceeded: {0}")]
    TimeoutExceeded(String),

    /// A bounded resource (listener slots, restart quota) is exhausted.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Suspending an orchestrator, or writing to a killed session.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Unexpected IO or other internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn busy(what: impl Into<String>) -> Self {
        Self::Busy(what.into())
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        Self::TimeoutExceeded(what.into())
    }

    pub fn resource_exhausted(what: impl Into<String>) -> Self {
        Self::ResourceExhausted(what.into())
    }

    pub fn failed_precondition(what: impl Into<String>) -> Self {
        Self::FailedPrecondition(what.into())
    }

    /// Stable string tag for this error's kind, independent of message text.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Busy(_) => "busy",
            Self::TimeoutExceeded(_) => "timeout_exceeded",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::FailedPrecondition(_) => "failed_precondition",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
