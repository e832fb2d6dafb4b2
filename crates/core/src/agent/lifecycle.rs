// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Suspend/rehydrate (C8): kill a session while preserving resume
//! identity, then bring it back later. Rehydrate is single-flight per
//! agent key using the same keyed-mutex shape as [`crate::delivery`] and
//! [`crate::store`] — concurrent callers collapse onto the call already
//! in flight and observe its outcome rather than racing separate restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::backend::SessionBackend;
use crate::error::{CoreError, CoreResult};
use crate::runtime::{RuntimeAdapter, StartConfig};

use super::registry::{AgentRecord, AgentStatus, ResumeToken};
use super::{AgentRegistry, AgentRole};

/// How long `rehydrate` polls the registry for the `active` status before
/// giving up.
pub const REHYDRATE_TIMEOUT: Duration = Duration::from_secs(30);
const REHYDRATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Suspend an active agent: stop its runtime-exit monitor (implicit once
/// the session is killed — no listener survives it), kill the session,
/// update status, and broadcast the change. The caller supplies the
/// resume token (e.g. the runtime's own conversation/session id) since
/// only the runtime adapter knows how to produce one.
///
/// Returns `Ok(true)` if this call performed the suspend, `Ok(false)` if
/// the agent was already suspended (idempotent no-op).
pub async fn suspend(
    registry: &AgentRegistry,
    backend: &SessionBackend,
    key: &str,
    resume_token: ResumeToken,
) -> CoreResult<bool> {
    let record = registry.get(key).ok_or_else(|| CoreError::not_found(format!("agent {key} not found")))?;

    if record.identity.role == AgentRole::Orchestrator {
        return Err(CoreError::failed_precondition("the orchestrator agent cannot be suspended"));
    }
    if record.status == AgentStatus::Suspended {
        return Ok(false);
    }

    if let Some(session_name) = &record.session_name {
        backend.kill_session(session_name).await?;
    }

    registry.mark_suspended(key, resume_token)?;
    Ok(true)
}

/// `createAgentSession`: bring a freshly-registered `inactive` member up to
/// `active` by starting its runtime. The same `mark_starting` ->
/// `adapter.start` -> `mark_active` composition [`super::restart::RestartManager`]
/// uses for the orchestrator, without the rate limiting that's specific to
/// restarts.
pub async fn create_agent_session(
    registry: &AgentRegistry,
    backend: &SessionBackend,
    adapter: &dyn RuntimeAdapter,
    key: &str,
    session_name: impl Into<String>,
    cwd: impl Into<String>,
) -> CoreResult<AgentRecord> {
    let record = registry.get(key).ok_or_else(|| CoreError::not_found(format!("agent {key} not found")))?;
    let is_orchestrator = record.identity.role == AgentRole::Orchestrator;
    let session_name = session_name.into();

    registry.mark_starting(key, session_name.clone())?;

    let start_result = adapter
        .start(
            backend,
            StartConfig { session_name, cwd: cwd.into(), cols: 80, rows: 24, env: Vec::new(), is_orchestrator },
        )
        .await;

    if let Err(e) = start_result {
        let _ = registry.mark_start_failed(key);
        return Err(e);
    }

    let activated = registry.mark_active(key)?;
    info!(agent = key, "agent session created");
    Ok(activated)
}

/// Single-flight rehydrate coordinator for C8's `suspended -> starting ->
/// active` path.
pub struct RehydrateCoordinator {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Default for RehydrateCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RehydrateCoordinator {
    pub fn new() -> Self {
        Self { locks: SyncMutex::new(HashMap::new()) }
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }

    /// Rehydrate the agent at `key` using `adapter` to recreate its
    /// session. Concurrent calls for the same key dedupe onto the first
    /// caller's attempt; every caller observes the same final status.
    pub async fn rehydrate(
        &self,
        registry: &AgentRegistry,
        backend: &SessionBackend,
        adapter: &dyn RuntimeAdapter,
        key: &str,
        new_session_name: impl Into<String>,
        cwd: impl Into<String>,
    ) -> CoreResult<AgentRecord> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let record = registry.get(key).ok_or_else(|| CoreError::not_found(format!("agent {key} not found")))?;
        if record.status == AgentStatus::Active {
            // Another caller's in-flight rehydrate (or a prior one) already
            // landed by the time we acquired the lock.
            return Ok(record);
        }
        if record.status != AgentStatus::Suspended {
            return Err(CoreError::failed_precondition(format!(
                "agent {key} cannot rehydrate from status {:?}",
                record.status
            )));
        }

        let is_orchestrator = record.identity.role == AgentRole::Orchestrator;
        let session_name = new_session_name.into();
        registry.mark_starting(key, session_name.clone())?;

        let start_result = adapter
            .start(
                backend,
                StartConfig { session_name, cwd: cwd.into(), cols: 80, rows: 24, env: Vec::new(), is_orchestrator },
            )
            .await;

        if let Err(e) = start_result {
            let _ = registry.mark_start_failed(key);
            return Err(e);
        }

        let activated = registry.mark_active(key)?;
        info!(agent = key, "agent rehydrated");
        Ok(activated)
    }

    /// Poll the registry until `key` reaches [`AgentStatus::Active`] (the
    /// shape callers outside the coordinator use when they only have a
    /// subscription handle, e.g. a second caller that arrived after the
    /// in-flight rehydrate already released the lock).
    pub async fn wait_for_active(&self, registry: &AgentRegistry, key: &str) -> CoreResult<AgentRecord> {
        let mut events = registry.subscribe();
        let deadline = Instant::now() + REHYDRATE_TIMEOUT;

        if let Some(record) = registry.get(key) {
            if record.status == AgentStatus::Active {
                return Ok(record);
            }
        }

        loop {
            if Instant::now() >= deadline {
                return Err(CoreError::timeout(format!("agent {key} did not become active in time")));
            }
            match tokio::time::timeout(REHYDRATE_POLL_INTERVAL, events.recv()).await {
                Ok(Ok(event)) if event.key == key && event.next == AgentStatus::Active => {
                    return registry.get(key).ok_or_else(|| CoreError::not_found(format!("agent {key} not found")));
                }
                Ok(Ok(_)) => continue,
                Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) => {
                    return Err(CoreError::Internal(format!("agent {key} status channel closed")))
                }
                Err(_elapsed) => continue,
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
