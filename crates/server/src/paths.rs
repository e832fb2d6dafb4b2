// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted file layout (spec §6), rooted under [`ServerConfig::home_dir`].
//!
//! No two components share a file; every path here is handed to
//! [`agentfleet_core::store::AtomicStore`] for reads and writes so corrupt
//! files get quarantined the same way everywhere.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn teams(&self) -> PathBuf {
        self.root.join("teams.json")
    }

    pub fn active_projects(&self) -> PathBuf {
        self.root.join("active-projects.json")
    }

    pub fn task_tracking(&self) -> PathBuf {
        self.root.join("task-tracking.json")
    }

    pub fn scheduled_messages(&self) -> PathBuf {
        self.root.join("scheduled-messages.json")
    }

    pub fn queue_state(&self) -> PathBuf {
        self.root.join("queue-state.json")
    }

    pub fn users(&self) -> PathBuf {
        self.root.join("users.json")
    }

    pub fn update_check(&self) -> PathBuf {
        self.root.join("update-check.json")
    }

    /// Chat history backing the external-chat reconciliation scan (C12).
    pub fn chat_history(&self) -> PathBuf {
        self.root.join("chat-history.json")
    }
}
