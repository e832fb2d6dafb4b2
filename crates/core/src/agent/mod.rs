// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent lifecycle (C7 registry, C8 suspend/rehydrate, C9 orchestrator
//! restart): tracks which session backs which team member, and the
//! status transitions between them.

pub mod lifecycle;
pub mod registry;
pub mod restart;

pub use registry::{AgentRecord, AgentRegistry, AgentStatus, ResumeToken, WorkingStatus};

use serde::{Deserialize, Serialize};

use crate::runtime::RuntimeType;

/// Role a registered agent plays. The orchestrator role is forbidden from
/// being suspended (§4.6): it's the thing driving everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Orchestrator,
    Member,
}

/// Identity of a registered agent: which team/member slot it fills, and
/// which runtime drives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub team_id: String,
    pub member_id: String,
    pub role: AgentRole,
}

impl AgentIdentity {
    pub fn key(&self) -> String {
        format!("{}:{}", self.team_id, self.member_id)
    }
}

/// Runtime type tagged onto an identity, persisted so a restart can
/// recreate the right kind of session without the caller respecifying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub identity: AgentIdentity,
    pub runtime_type: RuntimeType,
}

// `RuntimeType` has no derive macros of its own (it's a closed enum with a
// hand-written `parse`/`as_str`), so give it the serde impls `AgentSpec`
// needs via a stable string representation.
impl Serialize for RuntimeType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RuntimeType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RuntimeType::parse(&s).map_err(serde::de::Error::custom)
    }
}
