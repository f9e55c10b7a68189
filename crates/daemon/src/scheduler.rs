// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The periodic monitor loop.
//!
//! Every tick it enqueues a monitor request for each live activation,
//! re-queues PENDING activations the admission cap postponed, and
//! transitions activations whose worker queue went dark to
//! WORKERS_OFFLINE. It never touches containers itself — all engine
//! work happens in the managers the monitor requests fan out to.

use crate::dispatch;
use crate::env::Settings;
use crate::status::StatusManager;
use rr_core::{ActivationRequest, Clock, ProcessStatus};
use rr_storage::Store;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct MonitorScheduler<C: Clock> {
    store: Store,
    settings: Settings,
    clock: C,
}

impl<C: Clock> MonitorScheduler<C> {
    pub fn new(store: Store, settings: Settings, clock: C) -> Self {
        Self { store, settings, clock }
    }

    /// Run ticks until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        let interval = Duration::from_secs(self.settings.monitor_interval_secs.max(1));
        tracing::info!(interval_secs = interval.as_secs(), "monitor scheduler started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.tick().await;
        }
        tracing::info!("monitor scheduler stopped");
    }

    /// One reconciliation sweep.
    pub async fn tick(&self) {
        self.enqueue_monitors();
        self.requeue_pending();
        self.detect_offline_queues().await;
    }

    /// Every live or recovering activation gets a monitor request; the
    /// store deduplicates pending monitors.
    fn enqueue_monitors(&self) {
        let live = self.store.activations_with_status(&[
            ProcessStatus::Starting,
            ProcessStatus::Running,
            ProcessStatus::WorkersOffline,
        ]);
        for activation in live {
            if let Err(e) = dispatch::monitor_rulebook_process(&self.store, &activation.id) {
                tracing::warn!(activation_id = %activation.id, error = %e, "monitor enqueue failed");
            }
        }
    }

    /// PENDING activations with an empty queue were postponed by the
    /// admission cap (or had their restart dropped); try again.
    fn requeue_pending(&self) {
        for activation in self.store.activations_with_status(&[ProcessStatus::Pending]) {
            if !activation.is_enabled || self.store.has_pending_request(&activation.id) {
                continue;
            }
            tracing::info!(activation_id = %activation.id, "re-queueing pending activation");
            if let Err(e) = self.store.push_request(
                &activation.id,
                ActivationRequest::AutoStart,
                None,
                self.clock.epoch_ms(),
            ) {
                tracing::warn!(activation_id = %activation.id, error = %e, "auto start enqueue failed");
                continue;
            }
            match self.store.queue_for_activation(&activation.id) {
                Some(queue) => self.store.wake(&queue),
                None => self.store.wake_all(),
            }
        }
    }

    /// Queues that stopped reporting liveness take their processes and
    /// activations to WORKERS_OFFLINE. The monitor promotes them back
    /// once a worker reappears and the container still runs.
    async fn detect_offline_queues(&self) {
        let now = self.clock.epoch_ms();
        let window = self.settings.queue_liveness_secs * 1000;
        for queue in self.store.stale_queues(now, window) {
            for process in self.store.live_processes_on_queue(&queue) {
                if process.status == ProcessStatus::WorkersOffline
                    || !process.status.may_transition(ProcessStatus::WorkersOffline)
                {
                    continue;
                }
                tracing::warn!(
                    queue = %queue,
                    activation_id = %process.activation_id,
                    process_id = %process.id,
                    "worker queue is offline"
                );
                let msg = format!(
                    "No worker in queue {queue} has reported liveness; \
                     the rulebook process cannot be monitored."
                );
                let is_latest = self
                    .store
                    .get_activation(&process.activation_id)
                    .ok()
                    .and_then(|a| a.latest_process)
                    .is_some_and(|latest| latest == process.id);
                if !is_latest {
                    // A superseded run; nothing to transition.
                    continue;
                }
                let status =
                    StatusManager::new(self.store.clone(), process.activation_id.clone(), self.clock.clone());
                if let Err(e) =
                    status.set_latest_instance_status(ProcessStatus::WorkersOffline, Some(&msg)).await
                {
                    tracing::warn!(process_id = %process.id, error = %e, "offline process update failed");
                }
                if let Err(e) = status.set_status(ProcessStatus::WorkersOffline, Some(&msg)).await {
                    tracing::warn!(
                        activation_id = %process.activation_id,
                        error = %e,
                        "offline activation update failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
