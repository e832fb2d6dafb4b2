// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::agent::{AgentRole, AgentStatus};
use crate::backend::SessionBackend;
use crate::runtime::RuntimeType;
use crate::test_support::FakeRuntimeAdapter;

fn orchestrator() -> AgentIdentity {
    AgentIdentity { team_id: "team-a".to_string(), member_id: "orchestrator".to_string(), role: AgentRole::Orchestrator }
}

#[tokio::test]
async fn restart_brings_up_a_fresh_session_for_a_new_identity() {
    let registry = AgentRegistry::new();
    let backend = SessionBackend::new();
    let adapter = FakeRuntimeAdapter::new(RuntimeType::ClaudeCode);
    let manager = RestartManager::new();
    let identity = orchestrator();

    let restarted = manager.restart(&registry, &backend, &adapter, &identity, "orch-1", "/tmp").await.unwrap();
    assert!(restarted);
    let record = registry.get(&identity.key()).unwrap();
    assert_eq!(record.status, AgentStatus::Active);
    assert!(backend.session_exists("orch-1").await);
}

#[tokio::test]
async fn restart_kills_the_existing_session_before_respawning() {
    let registry = AgentRegistry::new();
    let backend = SessionBackend::new();
    let adapter = FakeRuntimeAdapter::new(RuntimeType::ClaudeCode);
    let manager = RestartManager::new();
    let identity = orchestrator();

    manager.restart(&registry, &backend, &adapter, &identity, "orch-1", "/tmp").await.unwrap();
    assert!(backend.session_exists("orch-1").await);

    manager.restart(&registry, &backend, &adapter, &identity, "orch-2", "/tmp").await.unwrap();
    assert!(!backend.session_exists("orch-1").await);
    assert!(backend.session_exists("orch-2").await);
}

#[tokio::test]
async fn restart_rate_limit_blocks_after_max_attempts_in_window() {
    let registry = AgentRegistry::new();
    let backend = SessionBackend::new();
    let adapter = FakeRuntimeAdapter::new(RuntimeType::ClaudeCode);
    let manager = RestartManager::new();
    let identity = orchestrator();

    for i in 0..MAX_RESTARTS_PER_WINDOW {
        let restarted = manager
            .restart(&registry, &backend, &adapter, &identity, format!("orch-{i}"), "/tmp")
            .await
            .unwrap();
        assert!(restarted);
    }

    let blocked = manager.restart(&registry, &backend, &adapter, &identity, "orch-over-limit", "/tmp").await.unwrap();
    assert!(!blocked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_restarts_collapse_to_one_attempt() {
    let registry = Arc::new(AgentRegistry::new());
    let backend = Arc::new(SessionBackend::new());
    let adapter = Arc::new(FakeRuntimeAdapter::new(RuntimeType::ClaudeCode));
    let manager = Arc::new(RestartManager::new());
    let identity = Arc::new(orchestrator());

    let r1 = Arc::clone(&registry);
    let b1 = Arc::clone(&backend);
    let a1 = Arc::clone(&adapter);
    let m1 = Arc::clone(&manager);
    let i1 = Arc::clone(&identity);
    let h1 = tokio::spawn(async move { m1.restart(&r1, &b1, a1.as_ref(), &i1, "orch-a", "/tmp").await });

    let r2 = Arc::clone(&registry);
    let b2 = Arc::clone(&backend);
    let a2 = Arc::clone(&adapter);
    let m2 = Arc::clone(&manager);
    let i2 = Arc::clone(&identity);
    let h2 = tokio::spawn(async move { m2.restart(&r2, &b2, a2.as_ref(), &i2, "orch-b", "/tmp").await });

    let (r1, r2) = tokio::join!(h1, h2);
    let outcomes = [r1.unwrap().unwrap(), r2.unwrap().unwrap()];
    // Exactly one of the two concurrent attempts should have performed the
    // restart; the other observes the in-flight guard and bails out.
    assert_eq!(outcomes.iter().filter(|&&did_restart| did_restart).count(), 1);
}
