// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session backend (C3): indexes [`PtySession`]s by name.
//!
//! Shaped after the registry the teacher uses for agent pods — a
//! `RwLock<HashMap<..>>` guarding register/deregister/list — but here the
//! entries are live PTY sessions rather than remote pod handles, so create
//! and kill also drive process lifecycle instead of just bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::pty::Boxed;
use crate::session::{PtySession, DEFAULT_RING_CAPACITY};

/// Default number of lines returned by `capture_output` when the caller
/// doesn't specify a count.
pub const DEFAULT_CAPTURE_LINES: usize = 100;
/// Hard ceiling on lines returned by `capture_output`, regardless of what
/// the caller asks for.
pub const MAX_CAPTURE_LINES: usize = 500;
/// Hard ceiling on the byte size of a single `capture_output` response.
pub const MAX_CAPTURE_BYTES: usize = 16 * 1024;

/// Options accepted by [`SessionBackend::create_session`].
#[derive(Debug, Clone)]
pub struct CreateSessionOptions {
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
    pub ring_capacity: Option<usize>,
}

impl Default for CreateSessionOptions {
    fn default() -> Self {
        Self { cwd: ".".to_string(), cols: 80, rows: 24, ring_capacity: None }
    }
}

/// Summary row returned by `list_sessions`.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub name: String,
    pub cwd: String,
    pub child_pid: u32,
    pub is_killed: bool,
}

/// Process-wide registry of live PTY sessions, indexed by name.
///
/// Construction is split from startup: `new` is synchronous and cheap,
/// matching the "sync accessor may return `None` until an async accessor
/// completes" shape the contract calls for — here modeled by the registry
/// always existing but starting empty, with `create_session` being the
/// async step that actually stands a session up.
pub struct SessionBackend {
    sessions: RwLock<HashMap<String, Arc<PtySession>>>,
}

impl Default for SessionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBackend {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }

    /// Create and register a new session under `name`. Fails if the name
    /// is already registered, whether or not that session is still alive.
    pub async fn create_session(
        &self,
        name: impl Into<String>,
        command: &[String],
        options: CreateSessionOptions,
    ) -> CoreResult<Arc<PtySession>> {
        let name = name.into();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&name) {
            return Err(CoreError::already_exists(format!("session {name} already exists")));
        }

        let backend = crate::pty::spawn::NativePty::spawn(command, options.cols, options.rows)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let ring_capacity = options.ring_capacity.unwrap_or(DEFAULT_RING_CAPACITY);
        let session = Arc::new(PtySession::spawn(name.clone(), options.cwd, backend.boxed(), ring_capacity));

        info!(session = %name, pid = session.child_pid(), "session created");
        sessions.insert(name, Arc::clone(&session));
        Ok(session)
    }

    /// Register an already-constructed session, used by tests that build
    /// sessions around fake backends.
    pub async fn register(&self, session: Arc<PtySession>) -> CoreResult<()> {
        let mut sessions = self.sessions.write().await;
        let name = session.name().to_string();
        if sessions.contains_key(&name) {
            return Err(CoreError::already_exists(format!("session {name} already exists")));
        }
        sessions.insert(name, session);
        Ok(())
    }

    pub async fn get_session(&self, name: &str) -> Option<Arc<PtySession>> {
        self.sessions.read().await.get(name).cloned()
    }

    pub async fn session_exists(&self, name: &str) -> bool {
        self.sessions.read().await.contains_key(name)
    }

    /// Kill and deregister `name`. Tolerant of an unknown or already-dead
    /// session: both are treated as success.
    pub async fn kill_session(&self, name: &str) -> CoreResult<()> {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(name)
        };
        match session {
            Some(session) => {
                session.force_kill().await?;
                debug!(session = %name, "session killed and deregistered");
                Ok(())
            }
            None => {
                warn!(session = %name, "kill requested for unknown session, ignoring");
                Ok(())
            }
        }
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| SessionSummary {
                name: s.name().to_string(),
                cwd: s.cwd().to_string(),
                child_pid: s.child_pid(),
                is_killed: s.is_killed(),
            })
            .collect()
    }

    /// Capture the tail of a session's output. `lines` is clamped to
    /// [`MAX_CAPTURE_LINES`] and defaults to [`DEFAULT_CAPTURE_LINES`] when
    /// zero; the payload itself is capped at [`MAX_CAPTURE_BYTES`].
    pub async fn capture_output(&self, name: &str, lines: usize) -> CoreResult<String> {
        let session = self
            .get_session(name)
            .await
            .ok_or_else(|| CoreError::not_found(format!("session {name} not found")))?;
        let lines = if lines == 0 { DEFAULT_CAPTURE_LINES } else { lines.min(MAX_CAPTURE_LINES) };
        Ok(session.capture_output(lines, MAX_CAPTURE_BYTES))
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
