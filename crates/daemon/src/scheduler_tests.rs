// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::MonitorScheduler;
use crate::env::Settings;
use rr_core::{Activation, ActivationRequest, FakeClock, ProcessStatus, RulebookProcess};
use rr_storage::Store;
use std::time::Duration;

struct Harness {
    store: Store,
    clock: FakeClock,
    settings: Settings,
}

impl Harness {
    fn new() -> Self {
        let clock = FakeClock::new();
        clock.set_epoch_ms(1_000_000);
        Self { store: Store::new(), clock, settings: Settings::default() }
    }

    fn scheduler(&self) -> MonitorScheduler<FakeClock> {
        MonitorScheduler::new(self.store.clone(), self.settings.clone(), self.clock.clone())
    }

    fn insert(&self, activation: Activation) -> rr_core::ActivationId {
        let id = activation.id.clone();
        self.store.insert_activation(activation).unwrap();
        id
    }

    fn kinds(&self, id: &rr_core::ActivationId) -> Vec<ActivationRequest> {
        self.store.pending_requests(id).iter().map(|r| r.request).collect()
    }
}

#[tokio::test]
async fn live_activations_get_monitor_requests() {
    let h = Harness::new();
    let running = h.insert(Activation::builder().status(ProcessStatus::Running).build());
    let starting = h.insert(Activation::builder().status(ProcessStatus::Starting).build());
    let stopped = h.insert(Activation::builder().status(ProcessStatus::Stopped).build());

    h.scheduler().tick().await;

    assert_eq!(h.kinds(&running), vec![ActivationRequest::Monitor]);
    assert_eq!(h.kinds(&starting), vec![ActivationRequest::Monitor]);
    assert!(h.kinds(&stopped).is_empty());
}

#[tokio::test]
async fn repeated_ticks_do_not_pile_up_monitors() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().status(ProcessStatus::Running).build());

    let scheduler = h.scheduler();
    scheduler.tick().await;
    scheduler.tick().await;
    scheduler.tick().await;

    assert_eq!(h.kinds(&id).len(), 1);
}

#[tokio::test]
async fn pending_activation_is_requeued() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().status(ProcessStatus::Pending).build());

    h.scheduler().tick().await;
    assert_eq!(h.kinds(&id), vec![ActivationRequest::AutoStart]);
}

#[tokio::test]
async fn disabled_pending_activation_is_left_alone() {
    let h = Harness::new();
    let id = h.insert(
        Activation::builder().status(ProcessStatus::Pending).is_enabled(false).build(),
    );
    h.scheduler().tick().await;
    assert!(h.kinds(&id).is_empty());
}

#[tokio::test]
async fn pending_with_queued_work_is_not_duplicated() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().status(ProcessStatus::Pending).build());
    h.store.push_request(&id, ActivationRequest::Start, None, 0).unwrap();

    h.scheduler().tick().await;
    assert_eq!(h.kinds(&id), vec![ActivationRequest::Start]);
}

#[tokio::test]
async fn stale_queue_takes_its_activation_offline() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().status(ProcessStatus::Running).build());
    let mut process = RulebookProcess::new(id.clone(), "demo", 0);
    process.status = ProcessStatus::Running;
    process.activation_pod_id = Some("pod-1".into());
    h.store.insert_process(process, "dead-queue").unwrap();

    h.store.record_queue_liveness("dead-queue", h.clock.epoch_ms());
    h.clock
        .advance(Duration::from_secs(h.settings.queue_liveness_secs + 1));

    h.scheduler().tick().await;

    let activation = h.store.get_activation(&id).unwrap();
    assert_eq!(activation.status, ProcessStatus::WorkersOffline);
    assert!(activation.status_message.contains("dead-queue"));
    let process = h.store.latest_process(&id).unwrap().unwrap();
    assert_eq!(process.status, ProcessStatus::WorkersOffline);
}

#[tokio::test]
async fn fresh_queue_stays_online() {
    let h = Harness::new();
    let id = h.insert(Activation::builder().status(ProcessStatus::Running).build());
    let mut process = RulebookProcess::new(id.clone(), "demo", 0);
    process.status = ProcessStatus::Running;
    h.store.insert_process(process, "live-queue").unwrap();
    h.store.record_queue_liveness("live-queue", h.clock.epoch_ms());

    h.scheduler().tick().await;
    assert_eq!(h.store.get_activation(&id).unwrap().status, ProcessStatus::Running);
}
