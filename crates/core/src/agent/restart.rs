// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator restart (C9): a dedicated rate-limited restart manager.
//! Bounded to [`MAX_RESTARTS_PER_WINDOW`] in a rolling window; concurrent
//! restart attempts collapse to one, the others returning `false`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::backend::SessionBackend;
use crate::error::CoreResult;
use crate::runtime::{RuntimeAdapter, StartConfig};

use super::{AgentIdentity, AgentRegistry};

/// Maximum orchestrator restarts allowed within [`RESTART_WINDOW`].
pub const MAX_RESTARTS_PER_WINDOW: usize = 3;
/// Rolling window over which restart attempts are rate-limited.
pub const RESTART_WINDOW: Duration = Duration::from_secs(300);

/// Restart manager for the single orchestrator session.
pub struct RestartManager {
    /// Timestamps of recent successful restarts, oldest first.
    recent: Mutex<VecDeque<Instant>>,
    /// Single-flight guard: only one restart attempt runs at a time.
    in_flight: AsyncMutex<()>,
}

impl Default for RestartManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RestartManager {
    pub fn new() -> Self {
        Self { recent: Mutex::new(VecDeque::new()), in_flight: AsyncMutex::new(()) }
    }

    fn prune_and_count(&self) -> usize {
        let cutoff = Instant::now() - RESTART_WINDOW;
        let mut recent = self.recent.lock();
        while matches!(recent.front(), Some(t) if *t < cutoff) {
            recent.pop_front();
        }
        recent.len()
    }

    /// Attempt to restart the orchestrator identified by `identity`.
    /// Returns `Ok(true)` if a restart was performed, `Ok(false)` if a
    /// concurrent restart was already in flight or the rate limit was hit.
    pub async fn restart(
        &self,
        registry: &AgentRegistry,
        backend: &SessionBackend,
        adapter: &dyn RuntimeAdapter,
        identity: &AgentIdentity,
        session_name: impl Into<String>,
        cwd: impl Into<String>,
    ) -> CoreResult<bool> {
        let guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(agent = %identity.key(), "restart already in flight, skipping");
                return Ok(false);
            }
        };

        if self.prune_and_count() >= MAX_RESTARTS_PER_WINDOW {
            warn!(agent = %identity.key(), "restart rate limit exceeded, skipping");
            return Ok(false);
        }

        let key = identity.key();
        let session_name = session_name.into();
        let cwd = cwd.into();

        if let Some(record) = registry.get(&key) {
            if let Some(existing_session) = record.session_name {
                let _ = backend.kill_session(&existing_session).await;
            }
            registry.reset_for_restart(&key)?;
        } else {
            registry.register(identity.clone(), adapter.runtime_type());
        }

        registry.mark_starting(&key, session_name.clone())?;
        let start_result = adapter
            .start(backend, StartConfig { session_name, cwd, cols: 80, rows: 24, env: Vec::new(), is_orchestrator: true })
            .await;

        if let Err(e) = start_result {
            let _ = registry.mark_start_failed(&key);
            drop(guard);
            return Err(e);
        }

        registry.mark_active(&key)?;
        self.recent.lock().push_back(Instant::now());
        info!(agent = %key, "orchestrator:restarted");
        drop(guard);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "restart_tests.rs"]
mod tests;
