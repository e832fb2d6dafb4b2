// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Orchestrator server: supervises a fleet of interactive AI coding agents
/// running in local PTY sessions.
#[derive(Debug, Clone, Parser)]
#[command(name = "agentfleetd", version, about)]
pub struct ServerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "AGENTFLEET_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9900, env = "AGENTFLEET_PORT")]
    pub port: u16,

    /// Bearer token for API auth. If unset, auth is disabled.
    #[arg(long, env = "AGENTFLEET_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Root directory for persisted JSON state (teams.json, queue-state.json, ...).
    #[arg(long, env = "AGENTFLEET_HOME")]
    pub home: Option<PathBuf>,

    /// Key used to derive the AES-256-GCM key for encrypting connected-service
    /// tokens in `users.json`. Falls back to a well-known dev key if unset
    /// (with a loud warning — never rely on this in production).
    #[arg(long, env = "AGENTFLEET_TOKEN_KEY")]
    pub token_key: Option<String>,

    /// How often the external-chat reconciliation task scans for pending
    /// notifications, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "AGENTFLEET_RECONCILE_POLL_MS")]
    pub reconcile_poll_ms: u64,

    /// Delay before the first reconciliation scan after startup, in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "AGENTFLEET_RECONCILE_STARTUP_DELAY_MS")]
    pub reconcile_startup_delay_ms: u64,
}

impl ServerConfig {
    /// Resolve the root directory persisted state lives under, creating it
    /// if necessary. Defaults to `~/.agentfleet`.
    pub fn home_dir(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(|| {
            dirs_home().unwrap_or_else(|| PathBuf::from(".")).join(".agentfleet")
        })
    }

    pub fn reconcile_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconcile_poll_ms)
    }

    pub fn reconcile_startup_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconcile_startup_delay_ms)
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
