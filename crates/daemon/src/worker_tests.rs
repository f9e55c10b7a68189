// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::Worker;
use crate::env::Settings;
use rr_core::{Activation, ActivationRequest, FakeClock, ProcessStatus};
use rr_engine::FakeEngine;
use rr_storage::Store;
use std::sync::Arc;

struct Harness {
    store: Store,
    engine: FakeEngine,
    clock: FakeClock,
}

impl Harness {
    fn new() -> Self {
        Self { store: Store::new(), engine: FakeEngine::new(), clock: FakeClock::new() }
    }

    fn worker(&self, queue: &str) -> Worker<FakeClock> {
        Worker::new(
            self.store.clone(),
            Arc::new(self.engine.clone()),
            Settings::default(),
            queue,
            self.clock.clone(),
        )
    }

    fn insert(&self, activation: Activation) -> rr_core::ActivationId {
        let id = activation.id.clone();
        self.store.insert_activation(activation).unwrap();
        id
    }
}

#[tokio::test]
async fn drain_executes_a_start() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().build());
    h.store.push_request(&id, ActivationRequest::Start, None, 0).unwrap();

    h.worker("q1").drain().await;

    assert_eq!(h.engine.start_count(), 1);
    assert!(!h.store.has_pending_request(&id));
    assert_eq!(h.store.get_activation(&id).unwrap().status, ProcessStatus::Starting);
}

#[tokio::test]
async fn auto_start_is_skipped_when_disabled() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().build());
    h.store.push_request(&id, ActivationRequest::AutoStart, None, 0).unwrap();
    h.store.update_activation(&id, |a| a.is_enabled = false).unwrap();

    h.worker("q1").drain().await;

    assert_eq!(h.engine.start_count(), 0);
    assert!(!h.store.has_pending_request(&id), "the row must still be consumed");
}

#[tokio::test]
async fn auto_start_counts_as_a_restart() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().build());
    h.store.push_request(&id, ActivationRequest::AutoStart, None, 0).unwrap();

    h.worker("q1").drain().await;

    assert_eq!(h.store.get_activation(&id).unwrap().restart_count, 1);
}

#[tokio::test]
async fn failed_request_is_still_acknowledged() {
    let h = Harness::new();
    // Disabled activations refuse to start; the row must be consumed
    // regardless.
    let id = h.insert(Activation::builder().is_enabled(false).build());
    h.store.push_request(&id, ActivationRequest::Start, None, 0).unwrap();

    h.worker("q1").drain().await;
    assert!(!h.store.has_pending_request(&id));
}

#[tokio::test]
async fn worker_ignores_activations_pinned_elsewhere() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().build());
    h.store
        .insert_process(rr_core::RulebookProcess::new(id.clone(), "demo", 0), "other-queue")
        .unwrap();
    h.store.push_request(&id, ActivationRequest::Monitor, None, 0).unwrap();

    h.worker("q1").drain().await;
    assert!(h.store.has_pending_request(&id), "pinned work stays put");
}

#[tokio::test]
async fn delayed_rows_run_once_due() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().build());
    let due = h.clock.epoch_ms() + 5_000;
    h.store.push_request(&id, ActivationRequest::AutoStart, None, due).unwrap();

    let worker = h.worker("q1");
    worker.drain().await;
    assert_eq!(h.engine.start_count(), 0);

    h.clock.advance(std::time::Duration::from_secs(6));
    worker.drain().await;
    assert_eq!(h.engine.start_count(), 1);
}
