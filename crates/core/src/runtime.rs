// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime adapter (C5): one implementation per supported interactive CLI,
//! each wrapping the session backend (C3) and command helper (C4) with an
//! init script and a liveness probe.
//!
//! Ready-detection follows the same "scan the tail of the screen for known
//! text" approach the Claude driver uses for startup-prompt detection,
//! narrowed here to a single idle-prompt pattern per runtime.

use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{CreateSessionOptions, SessionBackend};
use crate::command::{self, Key};
use crate::error::{CoreError, CoreResult};
use crate::session::PtySession;

/// The three interactive CLIs this orchestrator can drive. A closed
/// 3-way enum, deliberately without a catch-all `Unknown` variant: an
/// unrecognized runtime is a configuration error, not a valid state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    ClaudeCode,
    GeminiCli,
    CodexCli,
}

impl RuntimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::GeminiCli => "gemini-cli",
            Self::CodexCli => "codex-cli",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "claude-code" => Ok(Self::ClaudeCode),
            "gemini-cli" => Ok(Self::GeminiCli),
            "codex-cli" => Ok(Self::CodexCli),
            other => Err(CoreError::failed_precondition(format!("unknown runtime type: {other}"))),
        }
    }

    fn command(&self) -> Vec<String> {
        match self {
            Self::ClaudeCode => vec!["claude".to_string()],
            Self::GeminiCli => vec!["gemini".to_string()],
            Self::CodexCli => vec!["codex".to_string()],
        }
    }

    /// Text that shows up on-screen once the runtime has reached its idle
    /// prompt and is ready to receive input. Reused by [`crate::delivery`]
    /// as the "prompt ready" pattern: the same idle prompt that marks
    /// startup-readiness also marks "ready for the next message."
    pub fn ready_pattern(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "? for shortcuts",
            Self::GeminiCli => "Type your message",
            Self::CodexCli => "send a message",
        }
    }

    /// Text that shows up once a just-sent message has actually reached
    /// the runtime's input handling (as opposed to still sitting in the
    /// terminal's input buffer) — the delivery-confirmation pattern.
    pub fn delivery_confirmation_pattern(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "Thinking",
            Self::GeminiCli => "Working",
            Self::CodexCli => "thinking",
        }
    }

    /// Single byte written during `detect_runtime` to provoke a visible
    /// reaction (e.g. opening a command palette) without mutating state.
    fn probe_key(&self) -> Key {
        match self {
            Self::ClaudeCode => Key::Escape,
            Self::GeminiCli => Key::Escape,
            Self::CodexCli => Key::Escape,
        }
    }

    /// How long a freshly-spawned PTY gets to reach its ready pattern.
    /// Claude's startup script is the fastest to settle; the other two
    /// CLIs pull in more at launch and get a longer allowance. Orchestrator
    /// sessions get their own, longer budget regardless of runtime type
    /// (see [`ORCHESTRATOR_READY_TIMEOUT`]) since they also provision
    /// auxiliary servers during init.
    fn base_ready_timeout(&self) -> Duration {
        match self {
            Self::ClaudeCode => Duration::from_millis(45_000),
            Self::GeminiCli | Self::CodexCli => Duration::from_millis(90_000),
        }
    }
}

/// Ready-timeout override for the orchestrator role, regardless of
/// runtime type: its init does more (auxiliary server post-init) than a
/// plain member session.
pub const ORCHESTRATOR_READY_TIMEOUT: Duration = Duration::from_millis(120_000);
/// Interval between ready-pattern polls.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Configuration for starting a runtime-backed session.
#[derive(Debug, Clone)]
pub struct StartConfig {
    pub session_name: String,
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
    pub env: Vec<(String, String)>,
    /// Whether this session is the team's orchestrator. Drives both the
    /// ready-timeout override and the post-init step below.
    pub is_orchestrator: bool,
}

/// Per-runtime adapter: starts/stops a session running the given CLI and
/// knows how to tell when it's ready for input.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    fn runtime_type(&self) -> RuntimeType;

    /// Create the session (C3), set any requested environment variables
    /// (C4), run the runtime-specific init step, then wait for readiness.
    async fn start(&self, backend: &SessionBackend, config: StartConfig) -> CoreResult<()>;

    async fn stop(&self, backend: &SessionBackend, name: &str) -> CoreResult<()> {
        backend.kill_session(name).await
    }

    async fn write(&self, backend: &SessionBackend, name: &str, text: &str) -> CoreResult<()> {
        let session = session_or_gone(backend, name).await?;
        command::send_message(&session, text).await
    }

    async fn get_output(&self, backend: &SessionBackend, name: &str, lines: usize) -> CoreResult<String> {
        backend.capture_output(name, lines).await
    }

    async fn is_running(&self, backend: &SessionBackend, name: &str) -> bool {
        match backend.get_session(name).await {
            Some(session) => !session.is_killed(),
            None => false,
        }
    }

    /// Poll captured output until the runtime's ready pattern appears, or
    /// time out.
    async fn wait_for_ready(&self, backend: &SessionBackend, name: &str, timeout: Duration) -> CoreResult<()> {
        let pattern = self.runtime_type().ready_pattern();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let captured = backend.capture_output(name, 50).await?;
            if captured.contains(pattern) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CoreError::timeout(format!(
                    "runtime {} in session {name} did not reach ready state within {timeout:?}",
                    self.runtime_type().as_str()
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Confirm liveness even when the process looks alive: send a
    /// non-mutating probe key and check the screen actually reacted.
    async fn detect_runtime(&self, backend: &SessionBackend, name: &str) -> CoreResult<bool> {
        let session = session_or_gone(backend, name).await?;
        let before = session.capture_output(5, 4096);
        command::send_key(&session, self.runtime_type().probe_key()).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after = session.capture_output(5, 4096);
        Ok(before != after)
    }
}

async fn session_or_gone(backend: &SessionBackend, name: &str) -> CoreResult<std::sync::Arc<PtySession>> {
    backend.get_session(name).await.ok_or_else(|| CoreError::not_found(format!("session {name} not found")))
}

/// Adapter shared by all three runtimes: they differ only in the command
/// line, init script, ready pattern, and probe key, all captured by
/// [`RuntimeType`] already.
pub struct GenericRuntimeAdapter {
    runtime_type: RuntimeType,
}

impl GenericRuntimeAdapter {
    pub fn new(runtime_type: RuntimeType) -> Self {
        Self { runtime_type }
    }
}

#[async_trait]
impl RuntimeAdapter for GenericRuntimeAdapter {
    fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    async fn start(&self, backend: &SessionBackend, config: StartConfig) -> CoreResult<()> {
        let command = self.runtime_type.command();
        let options =
            CreateSessionOptions { cwd: config.cwd, cols: config.cols, rows: config.rows, ring_capacity: None };
        let session = backend.create_session(config.session_name.clone(), &command, options).await?;

        for (key, value) in &config.env {
            command::set_environment_variable(&session, key, value).await?;
        }

        let timeout =
            if config.is_orchestrator { ORCHESTRATOR_READY_TIMEOUT } else { self.runtime_type.base_ready_timeout() };
        self.wait_for_ready(backend, &config.session_name, timeout).await?;

        if config.is_orchestrator {
            self.post_init(backend, &config.session_name).await?;
        }

        Ok(())
    }
}

impl GenericRuntimeAdapter {
    /// Orchestrator-only step run once the session has reached its ready
    /// prompt: nudge it to register any auxiliary servers (e.g. MCP
    /// endpoints) it manages on behalf of the team. Best-effort — a
    /// missing auxiliary-server command is not fatal to startup.
    async fn post_init(&self, backend: &SessionBackend, name: &str) -> CoreResult<()> {
        let session = session_or_gone(backend, name).await?;
        command::send_message(&session, "/mcp").await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
