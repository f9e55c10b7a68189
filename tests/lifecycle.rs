// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end lifecycle scenarios, driven through the dispatch entry
//! points with the fake engine and a fake clock.

use rr_core::{
    Activation, ActivationId, ActivationRequest, Clock, FakeClock, ProcessStatus, RestartPolicy,
};
use rr_daemon::{dispatch, MonitorScheduler, Settings, Worker};
use rr_engine::{FakeEngine, FakeFailure};
use rr_storage::Store;
use std::sync::Arc;
use std::time::Duration;

const QUEUE: &str = "activation";

struct Orchestrator {
    store: Store,
    engine: FakeEngine,
    clock: FakeClock,
    settings: Settings,
}

impl Orchestrator {
    fn new() -> Self {
        let clock = FakeClock::new();
        clock.set_epoch_ms(1_000_000);
        let mut settings = Settings::default();
        // Fast restarts keep scenario timelines short; the queue liveness
        // window is pushed out so fake-clock jumps don't read as a dead
        // worker (offline detection has its own scenario).
        settings.restart_secs_on_failure = 1;
        settings.max_restarts_on_failure = 2;
        settings.queue_liveness_secs = 1_000_000;
        Self { store: Store::new(), engine: FakeEngine::new(), clock, settings }
    }

    fn activation(&self, restart_policy: RestartPolicy) -> ActivationId {
        let activation = Activation::builder().restart_policy(restart_policy).build();
        let id = activation.id.clone();
        self.store.insert_activation(activation).unwrap();
        id
    }

    fn worker(&self) -> Worker<FakeClock> {
        Worker::new(
            self.store.clone(),
            Arc::new(self.engine.clone()),
            self.settings.clone(),
            QUEUE,
            self.clock.clone(),
        )
    }

    fn scheduler(&self) -> MonitorScheduler<FakeClock> {
        MonitorScheduler::new(self.store.clone(), self.settings.clone(), self.clock.clone())
    }

    /// One monitor pass: scheduler tick plus a worker drain.
    async fn reconcile(&self) {
        self.scheduler().tick().await;
        self.worker().drain().await;
    }

    /// Dispatch a start and run it.
    async fn start(&self, id: &ActivationId) -> String {
        dispatch::start_rulebook_process(&self.store, id, None).unwrap();
        self.worker().drain().await;
        self.engine.handles().last().cloned().expect("start created no container")
    }

    /// Deliver a heartbeat and let the monitor promote to RUNNING.
    async fn heartbeat(&self, id: &ActivationId) {
        let process = self.store.latest_process(id).unwrap().unwrap();
        self.store
            .update_process(&process.id, |p| p.updated_at_ms = Some(self.clock.epoch_ms()))
            .unwrap();
        self.reconcile().await;
        assert_eq!(
            self.store.get_activation(id).unwrap().status,
            ProcessStatus::Running
        );
    }

    fn status(&self, id: &ActivationId) -> ProcessStatus {
        self.store.get_activation(id).unwrap().status
    }

    fn pending_kinds(&self, id: &ActivationId) -> Vec<ActivationRequest> {
        self.store.pending_requests(id).iter().map(|r| r.request).collect()
    }
}

// ── E1: clean exit, never restart ────────────────────────────────────

#[tokio::test]
async fn e1_clean_exit_with_never_policy_completes() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::Never);
    let handle = orch.start(&id).await;

    // The container exits 0 ten seconds in, before any heartbeat: the
    // process goes straight from STARTING to COMPLETED.
    orch.clock.advance(Duration::from_secs(10));
    orch.engine.set_status(&handle, ProcessStatus::Completed, "exited cleanly");
    orch.reconcile().await;

    assert_eq!(orch.status(&id), ProcessStatus::Completed);
    let process = orch.store.latest_process(&id).unwrap().unwrap();
    assert_eq!(process.status, ProcessStatus::Completed);
    assert!(orch.pending_kinds(&id).is_empty(), "no restart may be enqueued");
}

// ── E2: clean exit, always restart ───────────────────────────────────

#[tokio::test]
async fn e2_clean_exit_with_always_policy_restarts() {
    let mut orch = Orchestrator::new();
    orch.settings.restart_secs_on_complete = 5;
    let id = orch.activation(RestartPolicy::Always);
    let handle = orch.start(&id).await;

    // Same heartbeat-free clean exit as E1, restarted by policy.
    orch.clock.advance(Duration::from_secs(10));
    orch.engine.set_status(&handle, ProcessStatus::Completed, "exited cleanly");
    orch.reconcile().await;

    assert_eq!(orch.status(&id), ProcessStatus::Completed);
    let pending = orch.store.pending_requests(&id);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request, ActivationRequest::AutoStart);
    assert_eq!(pending[0].not_before_ms, orch.clock.epoch_ms() + 5_000);

    // The delayed start fires and yields a fresh process in STARTING.
    orch.clock.advance(Duration::from_secs(5));
    orch.worker().drain().await;

    assert_eq!(orch.status(&id), ProcessStatus::Starting);
    assert_eq!(orch.engine.start_count(), 2);
    let process = orch.store.latest_process(&id).unwrap().unwrap();
    assert_eq!(process.status, ProcessStatus::Starting);
    assert_eq!(orch.store.get_activation(&id).unwrap().restart_count, 1);
}

// ── E3: persistent failure hits the restart cap ──────────────────────

#[tokio::test]
async fn e3_persistent_failure_reaches_terminal_after_cap() {
    let orch = Orchestrator::new(); // max_restarts = 2
    let id = orch.activation(RestartPolicy::OnFailure);
    let mut handle = orch.start(&id).await;

    for round in 1..=3u32 {
        orch.engine
            .set_status(&handle, ProcessStatus::Failed, "Pod exited with code 1.");
        orch.reconcile().await;

        let activation = orch.store.get_activation(&id).unwrap();
        assert_eq!(activation.status, ProcessStatus::Failed);
        assert_eq!(activation.failure_count, round);

        if round < 3 {
            assert_eq!(orch.pending_kinds(&id), vec![ActivationRequest::AutoStart]);
            orch.clock.advance(Duration::from_secs(2));
            orch.worker().drain().await;
            handle = orch.engine.handles().last().cloned().unwrap();
        }
    }

    let activation = orch.store.get_activation(&id).unwrap();
    assert_eq!(activation.status, ProcessStatus::Failed);
    assert_eq!(activation.failure_count, 3);
    assert!(activation.status_message.contains("maximum number of restarts"));
    assert!(orch.pending_kinds(&id).is_empty(), "no further restart");
    assert_eq!(orch.engine.start_count(), 3);
}

// ── E4: image pull error counts as a failure ─────────────────────────

#[tokio::test]
async fn e4_image_pull_error_is_subject_to_restart_policy() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::OnFailure);
    orch.engine.fail_next_start(FakeFailure::ImagePull, "image unavailable");

    dispatch::start_rulebook_process(&orch.store, &id, None).unwrap();
    orch.worker().drain().await;

    let activation = orch.store.get_activation(&id).unwrap();
    assert_eq!(activation.status, ProcessStatus::Failed);
    assert_eq!(activation.failure_count, 1);
    let process = orch.store.latest_process(&id).unwrap().unwrap();
    assert_eq!(process.status, ProcessStatus::Failed);
    assert_eq!(orch.pending_kinds(&id), vec![ActivationRequest::AutoStart]);
}

// ── E5: missed heartbeats ────────────────────────────────────────────

#[tokio::test]
async fn e5_liveness_timeout_fails_and_restarts() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::OnFailure);
    orch.start(&id).await;
    orch.heartbeat(&id).await;

    orch.clock
        .advance(Duration::from_secs(orch.settings.liveness_timeout_secs + 1));
    orch.reconcile().await;

    let activation = orch.store.get_activation(&id).unwrap();
    assert_eq!(activation.status, ProcessStatus::Failed);
    assert!(activation.status_message.contains("unresponsive"));
    let process = orch.store.latest_process(&id).unwrap().unwrap();
    assert_eq!(process.status, ProcessStatus::Failed);
    assert!(process.status_message.contains("unresponsive"));
    assert_eq!(orch.pending_kinds(&id), vec![ActivationRequest::AutoStart]);
}

// ── E6: delete while a restart is queued ─────────────────────────────

#[tokio::test]
async fn e6_delete_drops_queued_restarts() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::OnFailure);
    let handle = orch.start(&id).await;

    orch.engine.set_status(&handle, ProcessStatus::Failed, "Pod exited with code 1.");
    orch.reconcile().await;
    assert_eq!(orch.pending_kinds(&id), vec![ActivationRequest::AutoStart]);

    dispatch::delete_rulebook_process(&orch.store, &id, None).unwrap();
    orch.worker().drain().await;

    assert!(orch.store.get_activation(&id).is_err(), "row must be removed");
    assert!(orch.engine.cleanup_count(&handle) >= 1, "cleanup is best effort");
    // The queued AUTO_START died with the activation.
    assert_eq!(orch.engine.start_count(), 1);
}

// ── request coalescing and idempotence ───────────────────────────────

#[tokio::test]
async fn adjacent_start_requests_run_once() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::Never);
    dispatch::start_rulebook_process(&orch.store, &id, None).unwrap();
    dispatch::start_rulebook_process(&orch.store, &id, None).unwrap();

    orch.worker().drain().await;

    assert_eq!(orch.engine.start_count(), 1);
    assert_eq!(orch.store.processes_for_activation(&id).len(), 1);
}

#[tokio::test]
async fn start_on_a_running_activation_is_a_no_op() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::Never);
    orch.start(&id).await;
    orch.heartbeat(&id).await;

    dispatch::start_rulebook_process(&orch.store, &id, None).unwrap();
    orch.worker().drain().await;

    assert_eq!(orch.engine.start_count(), 1, "no new container");
    assert_eq!(orch.store.processes_for_activation(&id).len(), 1, "no new process");
}

// ── running invariants ───────────────────────────────────────────────

#[tokio::test]
async fn running_activation_has_a_handle_and_zero_failures() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::OnFailure);
    orch.start(&id).await;
    orch.store.update_activation(&id, |a| a.failure_count = 2).unwrap();
    orch.heartbeat(&id).await;

    let activation = orch.store.get_activation(&id).unwrap();
    assert_eq!(activation.status, ProcessStatus::Running);
    assert_eq!(activation.failure_count, 0, "reset on first heartbeat");
    let process = orch.store.latest_process(&id).unwrap().unwrap();
    assert!(process.activation_pod_id.is_some());
    assert_eq!(process.status, ProcessStatus::Running);
}

#[tokio::test]
async fn stop_after_start_cleans_up_exactly_once() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::Never);
    let handle = orch.start(&id).await;

    dispatch::stop_rulebook_process(&orch.store, &id, None).unwrap();
    orch.worker().drain().await;

    assert_eq!(orch.status(&id), ProcessStatus::Stopped);
    assert_eq!(orch.engine.cleanup_count(&handle), 1);
}

// ── log streaming ────────────────────────────────────────────────────

#[tokio::test]
async fn replayed_log_lines_are_stored_once() {
    let orch = Orchestrator::new();
    let id = orch.activation(RestartPolicy::Never);
    let handle = orch.start(&id).await;
    let process = orch.store.latest_process(&id).unwrap().unwrap();
    let baseline = orch.store.log_line_count(&process.id);

    let batch = [
        "2024-05-01T10:00:01.000Z ruleset started",
        "2024-05-01T10:00:02.000Z waiting for events",
        "2024-05-01T10:00:02.000Z source plugin loaded",
    ];
    orch.engine.push_raw_logs(&handle, &batch);
    orch.reconcile().await;

    // The engine replays the same window plus one new line.
    let mut replay = batch.to_vec();
    replay.push("2024-05-01T10:00:03.000Z event received");
    orch.engine.push_raw_logs(&handle, &replay);
    orch.reconcile().await;

    let lines: Vec<String> = orch
        .store
        .logs_for_process(&process.id)
        .iter()
        .skip(baseline)
        .map(|l| l.line.clone())
        .collect();
    assert_eq!(
        lines,
        vec![
            "ruleset started",
            "waiting for events",
            "source plugin loaded",
            "event received"
        ]
    );
}

// ── admission control ────────────────────────────────────────────────

#[tokio::test]
async fn admission_cap_postpones_and_the_monitor_retries() {
    let mut orch = Orchestrator::new();
    orch.settings.max_running_activations = 1;
    let first = orch.activation(RestartPolicy::Never);
    let second = orch.activation(RestartPolicy::Never);

    orch.start(&first).await;
    dispatch::start_rulebook_process(&orch.store, &second, None).unwrap();
    orch.worker().drain().await;

    let postponed = orch.store.get_activation(&second).unwrap();
    assert_eq!(postponed.status, ProcessStatus::Pending);
    assert!(postponed.status_message.contains("No capacity"));

    // Free capacity, then let the monitor loop re-queue the pending one.
    dispatch::stop_rulebook_process(&orch.store, &first, None).unwrap();
    orch.worker().drain().await;
    orch.reconcile().await;

    assert_eq!(orch.status(&second), ProcessStatus::Starting);
    assert_eq!(orch.engine.start_count(), 2);
}
