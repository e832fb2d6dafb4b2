// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::AgentRole;
use crate::runtime::RuntimeType;

fn member_identity(id: &str) -> AgentIdentity {
    AgentIdentity { team_id: "team-a".to_string(), member_id: id.to_string(), role: AgentRole::Member }
}

fn orchestrator_identity() -> AgentIdentity {
    AgentIdentity { team_id: "team-a".to_string(), member_id: "orchestrator".to_string(), role: AgentRole::Orchestrator }
}

#[test]
fn register_is_idempotent() {
    let registry = AgentRegistry::new();
    let identity = member_identity("alice");
    let first = registry.register(identity.clone(), RuntimeType::ClaudeCode);
    let second = registry.register(identity.clone(), RuntimeType::ClaudeCode);
    assert_eq!(first.status, AgentStatus::Inactive);
    assert_eq!(second.status, AgentStatus::Inactive);
    assert_eq!(registry.list().len(), 1);
}

#[test]
fn happy_path_lifecycle_inactive_to_active() {
    let registry = AgentRegistry::new();
    let identity = member_identity("bob");
    let key = identity.key();
    registry.register(identity, RuntimeType::GeminiCli);

    let record = registry.mark_starting(&key, "session-bob").unwrap();
    assert_eq!(record.status, AgentStatus::Starting);
    assert_eq!(record.session_name.as_deref(), Some("session-bob"));

    let record = registry.mark_active(&key).unwrap();
    assert_eq!(record.status, AgentStatus::Active);
}

#[test]
fn mark_active_rejects_non_starting_source_status() {
    let registry = AgentRegistry::new();
    let identity = member_identity("carol");
    let key = identity.key();
    registry.register(identity, RuntimeType::CodexCli);

    let err = registry.mark_active(&key).unwrap_err();
    assert_eq!(err.kind(), "failed_precondition");
}

#[test]
fn start_failure_returns_to_inactive() {
    let registry = AgentRegistry::new();
    let identity = member_identity("dave");
    let key = identity.key();
    registry.register(identity, RuntimeType::ClaudeCode);
    registry.mark_starting(&key, "session-dave").unwrap();

    let record = registry.mark_start_failed(&key).unwrap();
    assert_eq!(record.status, AgentStatus::Inactive);
    assert!(record.session_name.is_none());
}

#[test]
fn suspend_is_idempotent() {
    let registry = AgentRegistry::new();
    let identity = member_identity("erin");
    let key = identity.key();
    registry.register(identity, RuntimeType::ClaudeCode);
    registry.mark_starting(&key, "s").unwrap();
    registry.mark_active(&key).unwrap();

    let first = registry.mark_suspended(&key, ResumeToken("tok-1".to_string())).unwrap();
    assert_eq!(first.status, AgentStatus::Suspended);

    let second = registry.mark_suspended(&key, ResumeToken("tok-2".to_string())).unwrap();
    assert_eq!(second.status, AgentStatus::Suspended);
    // Idempotent suspend doesn't clobber the already-stored resume token.
    assert_eq!(second.resume_token, first.resume_token);
}

#[test]
fn orchestrator_cannot_be_suspended() {
    let registry = AgentRegistry::new();
    let identity = orchestrator_identity();
    let key = identity.key();
    registry.register(identity, RuntimeType::ClaudeCode);
    registry.mark_starting(&key, "s").unwrap();
    registry.mark_active(&key).unwrap();

    let err = registry.mark_suspended(&key, ResumeToken("tok".to_string())).unwrap_err();
    assert_eq!(err.kind(), "failed_precondition");
}

#[test]
fn rehydrate_path_suspended_to_starting_to_active() {
    let registry = AgentRegistry::new();
    let identity = member_identity("frank");
    let key = identity.key();
    registry.register(identity, RuntimeType::GeminiCli);
    registry.mark_starting(&key, "s").unwrap();
    registry.mark_active(&key).unwrap();
    registry.mark_suspended(&key, ResumeToken("tok".to_string())).unwrap();

    let record = registry.mark_starting(&key, "s2").unwrap();
    assert_eq!(record.status, AgentStatus::Starting);
    let record = registry.mark_active(&key).unwrap();
    assert_eq!(record.status, AgentStatus::Active);
}

#[tokio::test]
async fn status_transitions_broadcast_to_subscribers() {
    let registry = AgentRegistry::new();
    let identity = member_identity("grace");
    let key = identity.key();
    registry.register(identity, RuntimeType::ClaudeCode);

    let mut rx = registry.subscribe();
    registry.mark_starting(&key, "s").unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.key, key);
    assert_eq!(event.previous, AgentStatus::Inactive);
    assert_eq!(event.next, AgentStatus::Starting);
}

#[test]
fn operations_on_unknown_agent_fail_not_found() {
    let registry = AgentRegistry::new();
    let err = registry.mark_active("nope:nope").unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
