// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request FIFO.
//!
//! Rows are ordered by id (insertion order) and carry a `not_before_ms`
//! visibility time so restart policy can schedule a delayed AUTO_START
//! without an in-process timer. Claiming is a transaction: the worker's
//! coalescing pass and the removal of the claimed row happen under the
//! writer lock, so a request is executed exactly once or coalesced away.

use super::Store;
use crate::error::StoreError;
use rr_core::{coalesce, ActivationId, ActivationRequest, QueuedRequest};

impl Store {
    /// Append a request row. Monitor rows are deduplicated: one pending
    /// monitor per activation is enough.
    pub fn push_request(
        &self,
        activation_id: &ActivationId,
        request: ActivationRequest,
        request_id: Option<String>,
        not_before_ms: u64,
    ) -> Result<u64, StoreError> {
        let id = self.next_request_id();
        self.write(|t| {
            if !t.activations.contains_key(activation_id) {
                return Err(StoreError::not_found("activation", activation_id.as_str()));
            }
            if request == ActivationRequest::Monitor {
                if let Some(existing) = t
                    .requests
                    .iter()
                    .find(|r| &r.activation_id == activation_id && r.request == request)
                {
                    return Ok(existing.id);
                }
            }
            t.requests.push(QueuedRequest {
                id,
                activation_id: activation_id.clone(),
                request,
                request_id,
                not_before_ms,
            });
            Ok(id)
        })
    }

    /// All pending rows for an activation, FIFO order.
    pub fn pending_requests(&self, activation_id: &ActivationId) -> Vec<QueuedRequest> {
        self.read(|t| {
            t.requests
                .iter()
                .filter(|r| &r.activation_id == activation_id)
                .cloned()
                .collect()
        })
    }

    pub fn has_pending_request(&self, activation_id: &ActivationId) -> bool {
        self.read(|t| t.requests.iter().any(|r| &r.activation_id == activation_id))
    }

    /// Remove pending AUTO_START rows for an activation (a stop or delete
    /// cancels any scheduled restart).
    pub fn cancel_auto_starts(&self, activation_id: &ActivationId) -> usize {
        self.write(|t| {
            let before = t.requests.len();
            t.requests.retain(|r| {
                !(&r.activation_id == activation_id
                    && r.request == ActivationRequest::AutoStart)
            });
            before - t.requests.len()
        })
    }

    /// Claim the next due request for a worker queue.
    ///
    /// Scans activations in order of their oldest pending row. An
    /// activation is eligible when its pinned queue matches, or when it
    /// has no pin yet (first start — any queue may adopt it). The
    /// activation's queue is coalesced first; the claimed row is removed
    /// in the same transaction.
    pub fn take_next_request(&self, queue_name: &str, now_ms: u64) -> Option<QueuedRequest> {
        self.write(|t| {
            // Activations in FIFO order of their oldest pending row.
            let mut seen = Vec::new();
            let candidates: Vec<ActivationId> = t
                .requests
                .iter()
                .filter(|r| {
                    if seen.contains(&r.activation_id) {
                        return false;
                    }
                    seen.push(r.activation_id.clone());
                    true
                })
                .map(|r| r.activation_id.clone())
                .collect();

            for activation_id in candidates {
                let pin = t
                    .activations
                    .get(&activation_id)
                    .and_then(|a| a.latest_process.as_ref())
                    .and_then(|pid| t.process_queue.get(pid));
                if pin.is_some_and(|p| p.as_str() != queue_name) {
                    continue;
                }

                let rows: Vec<QueuedRequest> = t
                    .requests
                    .iter()
                    .filter(|r| r.activation_id == activation_id)
                    .cloned()
                    .collect();
                let dropped = coalesce(&rows);
                if !dropped.is_empty() {
                    tracing::debug!(
                        activation_id = %activation_id,
                        dropped = dropped.len(),
                        "coalesced queued requests"
                    );
                    t.requests.retain(|r| !dropped.contains(&r.id));
                }

                let next = t
                    .requests
                    .iter()
                    .find(|r| r.activation_id == activation_id && r.not_before_ms <= now_ms)
                    .cloned();
                if let Some(row) = next {
                    t.requests.retain(|r| r.id != row.id);
                    return Some(row);
                }
            }
            None
        })
    }

}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
