// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry (C7): session ↔ member ↔ team mapping, status
//! transitions, and a broadcast hook for observers.
//!
//! Shaped after the mux's `SessionEntry` map + `Aggregator` broadcast
//! channel: a `RwLock<HashMap<key, Arc<Entry>>>` plus a `broadcast::Sender`
//! so any number of subscribers can watch status changes without the
//! registry needing to know who they are.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::runtime::RuntimeType;

use super::{AgentIdentity, AgentRole};

/// Lifecycle status of a registered agent. `starting -> inactive` is the
/// only regression allowed; everything else moves forward, with
/// `suspended -> starting -> active` permitted as the rehydrate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Inactive,
    Starting,
    Active,
    Suspended,
}

/// Orthogonal to [`AgentStatus`]: whether the agent is currently
/// processing a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingStatus {
    Idle,
    InProgress,
}

/// Opaque, runtime-specific identifier used to resume a suspended agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken(pub String);

/// A single registered agent and everything needed to find or restart it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub identity: AgentIdentity,
    pub runtime_type: RuntimeType,
    pub session_name: Option<String>,
    pub status: AgentStatus,
    pub working_status: WorkingStatus,
    pub resume_token: Option<ResumeToken>,
    pub updated_at_epoch_ms: u64,
}

impl AgentRecord {
    fn new(identity: AgentIdentity, runtime_type: RuntimeType) -> Self {
        Self {
            identity,
            runtime_type,
            session_name: None,
            status: AgentStatus::Inactive,
            working_status: WorkingStatus::Idle,
            resume_token: None,
            updated_at_epoch_ms: now_ms(),
        }
    }
}

/// Broadcast event emitted on every status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChanged {
    pub key: String,
    pub previous: AgentStatus,
    pub next: AgentStatus,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Registry of all known agents, keyed by `"{team_id}:{member_id}"`.
pub struct AgentRegistry {
    records: RwLock<HashMap<String, AgentRecord>>,
    events: broadcast::Sender<StatusChanged>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self { records: RwLock::new(HashMap::new()), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChanged> {
        self.events.subscribe()
    }

    /// Register a new agent identity in `inactive` status. A no-op if the
    /// identity is already registered (idempotent registration).
    pub fn register(&self, identity: AgentIdentity, runtime_type: RuntimeType) -> AgentRecord {
        let key = identity.key();
        let mut records = self.records.write();
        let newly_inserted = !records.contains_key(&key);
        let record = records.entry(key.clone()).or_insert_with(|| AgentRecord::new(identity, runtime_type)).clone();
        drop(records);

        if newly_inserted {
            // Not a real status transition (inactive -> inactive), but
            // subscribers (e.g. the server's teams.json snapshotter) key off
            // this broadcast to know the roster itself changed, not just a
            // member's status.
            self.emit(&key, AgentStatus::Inactive, AgentStatus::Inactive);
        }
        record
    }

    /// Restore a roster persisted by a previous process (teams.json).
    /// Records left `active`/`starting` belonged to PTYs owned by that
    /// process and have no session behind them anymore, so they're demoted
    /// to `inactive`; `suspended` records are left as-is since their resume
    /// token is still valid.
    pub fn restore(&self, records: Vec<AgentRecord>) {
        let mut map = self.records.write();
        for mut record in records {
            if matches!(record.status, AgentStatus::Active | AgentStatus::Starting) {
                record.status = AgentStatus::Inactive;
                record.session_name = None;
            }
            map.insert(record.identity.key(), record);
        }
    }

    pub fn get(&self, key: &str) -> Option<AgentRecord> {
        self.records.read().get(key).cloned()
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        self.records.read().values().cloned().collect()
    }

    /// `create_agent_session`: `inactive -> starting`. Binds the session
    /// name the caller is about to spawn.
    pub fn mark_starting(&self, key: &str, session_name: impl Into<String>) -> CoreResult<AgentRecord> {
        self.transition(key, |record| {
            if record.status != AgentStatus::Inactive && record.status != AgentStatus::Suspended {
                return Err(CoreError::failed_precondition(format!(
                    "agent {key} cannot start from status {:?}",
                    record.status
                )));
            }
            record.session_name = Some(session_name.into());
            Ok(AgentStatus::Starting)
        })
    }

    /// `starting -> active` once the runtime reports ready.
    pub fn mark_active(&self, key: &str) -> CoreResult<AgentRecord> {
        self.transition(key, |record| {
            if record.status != AgentStatus::Starting {
                return Err(CoreError::failed_precondition(format!(
                    "agent {key} cannot become active from status {:?}",
                    record.status
                )));
            }
            Ok(AgentStatus::Active)
        })
    }

    /// `starting -> inactive` on startup failure.
    pub fn mark_start_failed(&self, key: &str) -> CoreResult<AgentRecord> {
        self.transition(key, |record| {
            if record.status != AgentStatus::Starting {
                return Err(CoreError::failed_precondition(format!(
                    "agent {key} cannot fail start from status {:?}",
                    record.status
                )));
            }
            record.session_name = None;
            Ok(AgentStatus::Inactive)
        })
    }

    /// `active -> suspended`. Forbidden for the orchestrator role;
    /// idempotent (suspending a suspended agent is a no-op success).
    pub fn mark_suspended(&self, key: &str, resume_token: ResumeToken) -> CoreResult<AgentRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(key).ok_or_else(|| CoreError::not_found(format!("agent {key} not found")))?;

        if record.identity.role == AgentRole::Orchestrator {
            return Err(CoreError::failed_precondition("the orchestrator agent cannot be suspended"));
        }
        if record.status == AgentStatus::Suspended {
            return Ok(record.clone());
        }
        if record.status != AgentStatus::Active {
            return Err(CoreError::failed_precondition(format!(
                "agent {key} cannot suspend from status {:?}",
                record.status
            )));
        }

        let previous = record.status;
        record.status = AgentStatus::Suspended;
        record.session_name = None;
        record.resume_token = Some(resume_token);
        record.updated_at_epoch_ms = now_ms();
        let snapshot = record.clone();
        drop(records);

        self.emit(key, previous, AgentStatus::Suspended);
        info!(agent = key, "agent suspended");
        Ok(snapshot)
    }

    pub fn set_working_status(&self, key: &str, working_status: WorkingStatus) -> CoreResult<()> {
        let mut records = self.records.write();
        let record = records.get_mut(key).ok_or_else(|| CoreError::not_found(format!("agent {key} not found")))?;
        record.working_status = working_status;
        record.updated_at_epoch_ms = now_ms();
        Ok(())
    }

    /// Force `key` back to `inactive` regardless of its current status,
    /// clearing its session binding. Used by the restart manager (C9),
    /// which kills whatever session exists before respawning and doesn't
    /// need the normal transition guards to hold across that recovery path.
    pub fn reset_for_restart(&self, key: &str) -> CoreResult<AgentRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(key).ok_or_else(|| CoreError::not_found(format!("agent {key} not found")))?;
        let previous = record.status;
        record.status = AgentStatus::Inactive;
        record.session_name = None;
        record.updated_at_epoch_ms = now_ms();
        let snapshot = record.clone();
        drop(records);

        if previous != AgentStatus::Inactive {
            self.emit(key, previous, AgentStatus::Inactive);
        }
        Ok(snapshot)
    }

    fn transition(&self, key: &str, f: impl FnOnce(&mut AgentRecord) -> CoreResult<AgentStatus>) -> CoreResult<AgentRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(key).ok_or_else(|| CoreError::not_found(format!("agent {key} not found")))?;
        let previous = record.status;
        let next = f(record)?;
        record.status = next;
        record.updated_at_epoch_ms = now_ms();
        let snapshot = record.clone();
        drop(records);

        if previous != next {
            self.emit(key, previous, next);
        }
        Ok(snapshot)
    }

    fn emit(&self, key: &str, previous: AgentStatus, next: AgentStatus) {
        let _ = self.events.send(StatusChanged { key: key.to_string(), previous, next });
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
