// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reliable delivery (C6): at most one in-flight delivery per session,
//! prompt-detect, send, confirm, retry with backoff, all bounded by a
//! total wall-clock budget.
//!
//! The per-session single-flight lock follows the same keyed-mutex-map
//! shape [`crate::store::AtomicStore`] uses for per-path locks, just keyed
//! by session name instead of filesystem path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::backend::SessionBackend;
use crate::command;
use crate::error::CoreError;

/// How long to wait for the runtime's prompt pattern to appear before
/// giving up on this attempt.
pub const PROMPT_DETECTION_TIMEOUT: Duration = Duration::from_secs(10);
/// How long to wait for the confirmation pattern after sending.
pub const DELIVERY_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause between retry attempts.
pub const MESSAGE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Hard ceiling on total wall-clock spent across all attempts.
pub const TOTAL_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
/// Default value for [`DeliveryOptions::max_attempts`] when a caller has no
/// reason to override it.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

const PROMPT_POLL_INTERVAL: Duration = Duration::from_millis(150);
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Why a delivery attempt or the overall delivery failed. Only
/// `SessionGone` is terminal; the others are retried within budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    PromptNotReady,
    ConfirmationTimeout,
    SessionGone,
    MaxRetriesExceeded,
}

impl DeliveryFailure {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionGone)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::PromptNotReady => "prompt_not_ready",
            Self::ConfirmationTimeout => "confirmation_timeout",
            Self::SessionGone => "session_gone",
            Self::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller considers "the prompt is ready" / "delivery confirmed",
/// expressed as substrings to look for in the captured tail.
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    pub prompt_pattern: String,
    pub confirmation_pattern: String,
    pub clear_line_first: bool,
    /// Per-call ceiling on send attempts. Values of `0` are treated as `1`.
    pub max_attempts: u32,
}

/// Coordinates at most one in-flight delivery per session name.
pub struct DeliveryCoordinator {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Default for DeliveryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryCoordinator {
    pub fn new() -> Self {
        Self { locks: SyncMutex::new(HashMap::new()) }
    }

    fn lock_for(&self, session: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(session.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }

    /// Deliver `text` to `session`, serialized against any other delivery
    /// to the same session name. On success, returns the number of send
    /// attempts it took (spec's `{delivered: true, attempts}`), bounded by
    /// both `options.max_attempts` and the total wall-clock budget.
    pub async fn deliver(
        &self,
        backend: &SessionBackend,
        session_name: &str,
        text: &str,
        options: &DeliveryOptions,
    ) -> Result<u32, DeliveryFailure> {
        let lock = self.lock_for(session_name);
        let _guard = lock.lock().await;

        let deadline = Instant::now() + TOTAL_DELIVERY_TIMEOUT;
        let max_attempts = options.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if attempt > max_attempts {
                return Err(DeliveryFailure::MaxRetriesExceeded);
            }
            if Instant::now() >= deadline {
                return Err(DeliveryFailure::MaxRetriesExceeded);
            }

            match self.attempt_once(backend, session_name, text, options, deadline).await {
                Ok(()) => return Ok(attempt),
                Err(DeliveryFailure::SessionGone) => return Err(DeliveryFailure::SessionGone),
                Err(failure) => {
                    warn!(session = session_name, attempt, %failure, "delivery attempt failed, retrying");
                    if attempt >= max_attempts || Instant::now() + MESSAGE_RETRY_DELAY >= deadline {
                        return Err(DeliveryFailure::MaxRetriesExceeded);
                    }
                    tokio::time::sleep(MESSAGE_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        backend: &SessionBackend,
        session_name: &str,
        text: &str,
        options: &DeliveryOptions,
        deadline: Instant,
    ) -> Result<(), DeliveryFailure> {
        let session = backend.get_session(session_name).await.ok_or(DeliveryFailure::SessionGone)?;

        let prompt_deadline = Instant::now() + PROMPT_DETECTION_TIMEOUT.min(time_left(deadline));
        loop {
            if session.is_killed() {
                return Err(DeliveryFailure::SessionGone);
            }
            let captured = session.capture_output(50, 16 * 1024);
            if captured.contains(&options.prompt_pattern) {
                break;
            }
            if Instant::now() >= prompt_deadline {
                return Err(DeliveryFailure::PromptNotReady);
            }
            tokio::time::sleep(PROMPT_POLL_INTERVAL).await;
        }

        if options.clear_line_first {
            command::clear_current_command_line(&session).await.map_err(core_err_to_session_gone)?;
        }
        command::send_message(&session, text).await.map_err(core_err_to_session_gone)?;

        let confirm_deadline = Instant::now() + DELIVERY_CONFIRMATION_TIMEOUT.min(time_left(deadline));
        loop {
            if session.is_killed() {
                return Err(DeliveryFailure::SessionGone);
            }
            let captured = session.capture_output(50, 16 * 1024);
            if captured.contains(&options.confirmation_pattern) {
                debug!(session = session_name, "delivery confirmed");
                return Ok(());
            }
            if Instant::now() >= confirm_deadline {
                return Err(DeliveryFailure::ConfirmationTimeout);
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

fn time_left(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn core_err_to_session_gone(_e: CoreError) -> DeliveryFailure {
    DeliveryFailure::SessionGone
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
