// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler (C11): one-shot and recurring timers, including an adaptive
//! variant whose interval shrinks or grows with observed agent activity.
//!
//! Grounded on `crates/mux/src/upstream/poller.rs`'s
//! `tokio::time::interval` + `CancellationToken` select loop, generalized
//! from two fixed pollers to N dynamically registered jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::{EnqueueInput, MessageQueue, QueueSource, SystemEventMeta};

/// Centre of the adaptive interval's range.
pub const BASE_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// Floor the adaptive interval shrinks toward under high activity.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Ceiling the adaptive interval grows toward under idleness.
pub const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Multiplicative step applied to the adaptive interval on each tick.
pub const ADJUSTMENT_FACTOR: f64 = 1.5;

/// Named defaults spec.md §4.8 calls out for the built-in check-in jobs.
pub const INITIAL_CHECK_DELAY: Duration = Duration::from_secs(5 * 60);
pub const PROGRESS_CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const COMMIT_REMINDER_INTERVAL: Duration = Duration::from_secs(25 * 60);

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What a fired job dispatches. `Enqueue` is the common case (goes through
/// C10 like any other message); `DirectWrite` is for very short low-priority
/// pings spec.md allows skipping the queue for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobAction {
    Enqueue { target: String, content: String },
    DirectWrite { target: String, content: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    OneShot,
    Recurring,
    Continuation,
    Adaptive,
}

#[derive(Debug, Clone)]
pub struct ScheduleParams {
    pub session: String,
    pub action: JobAction,
    pub delay: Duration,
    /// `None` for a one-shot; `Some(n)` caps a recurring job's fire count.
    pub max_occurrences: Option<u32>,
}

struct Job {
    id: String,
    session: String,
    kind: JobKind,
    action: JobAction,
    occurrences: u32,
    max_occurrences: Option<u32>,
    /// The job's configured re-arm interval (recurring/adaptive) or initial
    /// delay (one-shot/continuation), kept around so a persisted snapshot
    /// can re-derive a reasonable restart delay (open question (b): restart
    /// re-arms "from now" using this interval, not the original absolute
    /// schedule).
    interval: Duration,
    cancel: CancellationToken,
}

/// On-disk shape of a still-active job, written to `scheduled-messages.json`
/// after every spawn/cancel/fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedJob {
    pub id: String,
    pub session: String,
    pub kind: JobKind,
    pub action: JobAction,
    pub occurrences: u32,
    pub max_occurrences: Option<u32>,
    pub interval_ms: u64,
}

/// Snapshot returned by [`Scheduler::get_stats`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStats {
    pub active_jobs: usize,
    pub total_fired: u64,
    pub total_cancelled: u64,
    pub total_errors: u64,
}

#[derive(Default)]
struct Counters {
    total_fired: u64,
    total_cancelled: u64,
    total_errors: u64,
}

/// Per-session activity signal the adaptive job consults, updated by PTY
/// output events (`Active` on output, decaying back to `Idle` on silence).
#[derive(Default)]
struct ActivityTracker {
    last_active_ms: Mutex<HashMap<String, u64>>,
}

impl ActivityTracker {
    fn mark_active(&self, session: &str) {
        self.last_active_ms.lock().insert(session.to_string(), now_ms());
    }

    /// Activity is considered "high" if output was observed inside the
    /// current adaptive interval's worth of recency.
    fn is_active(&self, session: &str, within: Duration) -> bool {
        let Some(last) = self.last_active_ms.lock().get(session).copied() else { return false };
        now_ms().saturating_sub(last) < within.as_millis() as u64
    }
}

/// Handle used by [`crate::ws`] (or anywhere PTY output is observed) to
/// feed the adaptive scheduler's activity signal.
#[derive(Clone)]
pub struct ActivityHandle {
    tracker: Arc<ActivityTracker>,
}

impl ActivityHandle {
    pub fn note_output(&self, session: &str) {
        self.tracker.mark_active(session);
    }
}

struct JobRegistry {
    jobs: HashMap<String, Job>,
}

/// Job engine: every registered timer runs as its own cancellable task
/// that dispatches into [`MessageQueue`] (or writes directly) on fire.
pub struct Scheduler {
    registry: Arc<Mutex<JobRegistry>>,
    counters: Arc<Mutex<Counters>>,
    activity: Arc<ActivityTracker>,
    fired_tx: mpsc::UnboundedSender<FiredJob>,
    /// Notified after every spawn/cancel/fire so a background task can
    /// re-snapshot `scheduled-messages.json`, the same "persist after every
    /// mutation" discipline the queue (C10) uses for queue-state.json.
    dirty: Arc<Notify>,
}

pub struct FiredJob {
    action: JobAction,
}

impl Scheduler {
    /// `fired_rx` is drained by [`Self::run_dispatcher`], which is the only
    /// place queue/direct-write side effects actually happen — keeps every
    /// per-job task's only responsibility "wait, then report."
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredJob>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            registry: Arc::new(Mutex::new(JobRegistry { jobs: HashMap::new() })),
            counters: Arc::new(Mutex::new(Counters::default())),
            activity: Arc::new(ActivityTracker::default()),
            fired_tx,
            dirty: Arc::new(Notify::new()),
        };
        (scheduler, fired_rx)
    }

    pub fn activity_handle(&self) -> ActivityHandle {
        ActivityHandle { tracker: Arc::clone(&self.activity) }
    }

    /// Resolves once after the scheduler's job set has changed since the
    /// last call; used by the server's `scheduled-messages.json` writer to
    /// wait for mutations instead of polling.
    pub async fn changed(&self) {
        self.dirty.notified().await;
    }

    /// Point-in-time snapshot of every still-active job, suitable for
    /// persisting to `scheduled-messages.json`.
    pub fn snapshot(&self) -> Vec<PersistedJob> {
        self.registry
            .lock()
            .jobs
            .values()
            .map(|job| PersistedJob {
                id: job.id.clone(),
                session: job.session.clone(),
                kind: job.kind,
                action: job.action.clone(),
                occurrences: job.occurrences,
                max_occurrences: job.max_occurrences,
                interval_ms: job.interval.as_millis() as u64,
            })
            .collect()
    }

    /// Re-arm every job from a previous process's `scheduled-messages.json`.
    /// Per the restart-reschedule resolution: every restored job re-arms
    /// `interval_ms` from now rather than honoring whatever absolute time it
    /// was originally due, since that original deadline has no meaning
    /// across a restart.
    pub fn restore(&self, jobs: Vec<PersistedJob>) {
        for persisted in jobs {
            let params = ScheduleParams {
                session: persisted.session,
                action: persisted.action,
                delay: Duration::from_millis(persisted.interval_ms),
                max_occurrences: persisted.max_occurrences,
            };
            self.spawn_with(persisted.kind, params, persisted.max_occurrences, persisted.occurrences, Some(persisted.id));
        }
    }

    /// Drains fired jobs and turns them into queue enqueues / direct
    /// writes. Runs for the server's lifetime.
    pub async fn run_dispatcher(
        mut fired_rx: mpsc::UnboundedReceiver<FiredJob>,
        queue: Arc<MessageQueue>,
        backend: Arc<agentfleet_core::backend::SessionBackend>,
        registry: Arc<agentfleet_core::agent::AgentRegistry>,
        delivery: Arc<agentfleet_core::delivery::DeliveryCoordinator>,
    ) {
        while let Some(fired) = fired_rx.recv().await {
            match fired.action {
                JobAction::Enqueue { target, content } => {
                    queue
                        .enqueue(EnqueueInput {
                            content,
                            target,
                            source: QueueSource::SystemEvent {
                                meta: SystemEventMeta { kind: "scheduler".to_string() },
                            },
                        })
                        .await;
                }
                JobAction::DirectWrite { target, content } => {
                    if let Some(record) = registry.get(&target) {
                        if let Some(session_name) = record.session_name {
                            let options = agentfleet_core::delivery::DeliveryOptions {
                                prompt_pattern: record.runtime_type.ready_pattern().to_string(),
                                confirmation_pattern: record.runtime_type.delivery_confirmation_pattern().to_string(),
                                clear_line_first: false,
                                max_attempts: agentfleet_core::delivery::MAX_DELIVERY_ATTEMPTS,
                            };
                            if let Err(e) = delivery.deliver(&backend, &session_name, &content, &options).await {
                                warn!(target = %target, err = %e, "scheduler direct-write delivery failed");
                            }
                        }
                    }
                }
            }
        }
    }

    /// `schedule_check`: a one-shot timer.
    pub fn schedule_check(&self, params: ScheduleParams) -> String {
        self.spawn(JobKind::OneShot, params, None)
    }

    /// `schedule_continuation`: a one-shot timer tagged as a continuation
    /// prompt, semantically identical to [`Self::schedule_check`] but kept
    /// distinct so callers and logs can tell the two apart.
    pub fn schedule_continuation(&self, params: ScheduleParams) -> String {
        self.spawn(JobKind::Continuation, params, None)
    }

    /// `schedule_recurring`: re-arms after each fire until
    /// `max_occurrences` is reached (or forever if `None`).
    pub fn schedule_recurring(&self, params: ScheduleParams) -> String {
        let max = params.max_occurrences;
        self.spawn(JobKind::Recurring, params, max)
    }

    /// `schedule_adaptive`: like recurring, but the delay between fires is
    /// recomputed from the session's activity signal each time.
    pub fn schedule_adaptive(&self, params: ScheduleParams) -> String {
        let max = params.max_occurrences;
        self.spawn(JobKind::Adaptive, params, max)
    }

    fn spawn(&self, kind: JobKind, params: ScheduleParams, max_occurrences: Option<u32>) -> String {
        self.spawn_with(kind, params, max_occurrences, 0, None)
    }

    /// Shared by fresh scheduling and [`Self::restore`]; `start_occurrences`
    /// and an explicit `id` let a restored job resume its fire count and
    /// keep its prior identity instead of starting over.
    fn spawn_with(
        &self,
        kind: JobKind,
        params: ScheduleParams,
        max_occurrences: Option<u32>,
        start_occurrences: u32,
        id: Option<String>,
    ) -> String {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let cancel = CancellationToken::new();
        let job = Job {
            id: id.clone(),
            session: params.session.clone(),
            kind,
            action: params.action.clone(),
            occurrences: start_occurrences,
            max_occurrences,
            interval: params.delay,
            cancel: cancel.clone(),
        };
        self.registry.lock().jobs.insert(id.clone(), job);
        self.dirty.notify_one();

        let registry = Arc::clone(&self.registry);
        let counters = Arc::clone(&self.counters);
        let activity = Arc::clone(&self.activity);
        let fired_tx = self.fired_tx.clone();
        let dirty = Arc::clone(&self.dirty);
        let job_id = id.clone();
        let initial_delay = params.delay;

        tokio::spawn(async move {
            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        counters.lock().total_cancelled += 1;
                        debug!(job = %job_id, "job cancelled before firing");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                let (action, session, kind, occurrences, max_occurrences) = {
                    let mut reg = registry.lock();
                    let Some(job) = reg.jobs.get_mut(&job_id) else { break };
                    job.occurrences += 1;
                    (job.action.clone(), job.session.clone(), job.kind, job.occurrences, job.max_occurrences)
                };

                counters.lock().total_fired += 1;
                info!(job = %job_id, session = %session, occurrences, "job fired");
                if fired_tx.send(FiredJob { action }).is_err() {
                    warn!(job = %job_id, "dispatcher gone, dropping fired job");
                    counters.lock().total_errors += 1;
                }

                let keep_going = match kind {
                    JobKind::OneShot | JobKind::Continuation => false,
                    JobKind::Recurring => max_occurrences.map_or(true, |max| occurrences < max),
                    JobKind::Adaptive => {
                        delay = next_adaptive_interval(delay, activity.is_active(&session, delay));
                        max_occurrences.map_or(true, |max| occurrences < max)
                    }
                };

                if !keep_going {
                    registry.lock().jobs.remove(&job_id);
                    dirty.notify_one();
                    break;
                }
                if matches!(kind, JobKind::Recurring) {
                    delay = initial_delay;
                }
                if let Some(job) = registry.lock().jobs.get_mut(&job_id) {
                    job.interval = delay;
                }
                dirty.notify_one();
            }
        });

        id
    }

    /// Cancel a job by id. A no-op (not an error) if it already fired and
    /// was a one-shot, per spec.md §4.8.
    pub fn cancel(&self, id: &str) -> bool {
        let mut reg = self.registry.lock();
        match reg.jobs.remove(id) {
            Some(job) => {
                job.cancel.cancel();
                drop(reg);
                self.dirty.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all_for(&self, session: &str) -> usize {
        let mut reg = self.registry.lock();
        let ids: Vec<String> =
            reg.jobs.values().filter(|j| j.session == session).map(|j| j.id.clone()).collect();
        for id in &ids {
            if let Some(job) = reg.jobs.remove(id) {
                job.cancel.cancel();
            }
        }
        drop(reg);
        if !ids.is_empty() {
            self.dirty.notify_one();
        }
        ids.len()
    }

    pub fn get_stats(&self) -> SchedulerStats {
        let active_jobs = self.registry.lock().jobs.len();
        let counters = self.counters.lock();
        SchedulerStats {
            active_jobs,
            total_fired: counters.total_fired,
            total_cancelled: counters.total_cancelled,
            total_errors: counters.total_errors,
        }
    }

    /// Drop any job bookkeeping left behind by tasks that have already
    /// exited (normal exit already self-removes; this catches the case
    /// where a job's task panicked without reaching that cleanup).
    pub fn cleanup(&self) {
        let mut reg = self.registry.lock();
        reg.jobs.retain(|_, job| !job.cancel.is_cancelled());
    }
}

/// Multiplicative step toward `MIN_INTERVAL` when active, toward
/// `MAX_INTERVAL` when idle, centred on `BASE_INTERVAL`.
fn next_adaptive_interval(current: Duration, active: bool) -> Duration {
    let next_secs = if active {
        (current.as_secs_f64() / ADJUSTMENT_FACTOR).max(MIN_INTERVAL.as_secs_f64())
    } else {
        (current.as_secs_f64() * ADJUSTMENT_FACTOR).min(MAX_INTERVAL.as_secs_f64())
    };
    Duration::from_secs_f64(next_secs)
}
