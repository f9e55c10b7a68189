// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-queue worker loop.
//!
//! One worker serves one queue and executes one request at a time —
//! per-activation serialization falls out of the FIFO claim plus the
//! row locks inside the manager. The loop parks on the queue's wake
//! handle with a bounded tick so delayed AUTO_STARTs become visible
//! without an explicit wake.

use crate::env::Settings;
use crate::manager::ActivationManager;
use rr_core::{ActivationRequest, Clock, QueuedRequest};
use rr_engine::ContainerEngine;
use rr_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long a worker parks before rechecking for due rows.
const WORKER_TICK: Duration = Duration::from_millis(500);

pub struct Worker<C: Clock> {
    store: Store,
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
    queue_name: String,
    clock: C,
}

impl<C: Clock> Worker<C> {
    pub fn new(
        store: Store,
        engine: Arc<dyn ContainerEngine>,
        settings: Settings,
        queue_name: impl Into<String>,
        clock: C,
    ) -> Self {
        Self { store, engine, settings, queue_name: queue_name.into(), clock }
    }

    /// Serve the queue until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        self.store.register_queue(&self.queue_name);
        tracing::info!(queue = %self.queue_name, "worker started");

        loop {
            self.store.record_queue_liveness(&self.queue_name, self.clock.epoch_ms());
            self.drain().await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.store.wait_for_wake(&self.queue_name, WORKER_TICK) => {}
            }
        }
        tracing::info!(queue = %self.queue_name, "worker stopped");
    }

    /// Execute every due request, one at a time.
    pub async fn drain(&self) {
        self.store.record_queue_liveness(&self.queue_name, self.clock.epoch_ms());
        while let Some(row) = self.store.take_next_request(&self.queue_name, self.clock.epoch_ms())
        {
            self.execute(row).await;
            self.store.record_queue_liveness(&self.queue_name, self.clock.epoch_ms());
        }
    }

    async fn execute(&self, row: QueuedRequest) {
        let manager = ActivationManager::new(
            self.store.clone(),
            Arc::clone(&self.engine),
            self.settings.clone(),
            &self.queue_name,
            row.activation_id.clone(),
            self.clock.clone(),
        );

        tracing::info!(
            queue = %self.queue_name,
            activation_id = %row.activation_id,
            request = %row.request,
            request_id = row.request_id.as_deref().unwrap_or(""),
            "dispatching request"
        );

        let result = match row.request {
            ActivationRequest::Start => manager.start(false).await,
            ActivationRequest::AutoStart => {
                // A scheduled restart must not fire if the user disabled
                // the activation after it was queued.
                match self.store.get_activation(&row.activation_id) {
                    Ok(activation) if activation.is_enabled => manager.start(true).await,
                    Ok(_) => {
                        tracing::info!(
                            activation_id = %row.activation_id,
                            "auto start skipped: activation disabled"
                        );
                        Ok(())
                    }
                    Err(_) => {
                        tracing::info!(
                            activation_id = %row.activation_id,
                            "auto start skipped: activation gone"
                        );
                        Ok(())
                    }
                }
            }
            ActivationRequest::Stop => manager.stop().await,
            ActivationRequest::Restart => manager.restart().await,
            ActivationRequest::Delete => manager.delete().await,
            ActivationRequest::Monitor => manager.monitor().await,
        };

        // The managers record failures on the activation themselves;
        // the request is acknowledged either way.
        if let Err(e) = result {
            tracing::error!(
                queue = %self.queue_name,
                activation_id = %row.activation_id,
                request = %row.request,
                error = %e,
                "request failed"
            );
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
