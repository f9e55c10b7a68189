// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch: the entry points the API layer calls.
//!
//! Each entry point appends one row to the activation's request queue
//! and wakes the worker serving its pinned queue (or every queue for an
//! activation that has never run). The caller gets an immediate async
//! ack; execution happens on a worker. Coalescing of the queued rows is
//! applied at claim time, inside the store's take transaction.

use rr_core::{ActivationId, ActivationRequest};
use rr_storage::{Store, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn enqueue(
    store: &Store,
    activation_id: &ActivationId,
    request: ActivationRequest,
    request_id: Option<String>,
) -> Result<(), DispatchError> {
    store.push_request(activation_id, request, request_id.clone(), 0)?;
    tracing::info!(
        %activation_id,
        request = %request,
        request_id = request_id.as_deref().unwrap_or(""),
        "request queued"
    );
    match store.queue_for_activation(activation_id) {
        Some(queue) => store.wake(&queue),
        None => store.wake_all(),
    }
    Ok(())
}

/// Queue a start of the activation's rulebook process.
pub fn start_rulebook_process(
    store: &Store,
    activation_id: &ActivationId,
    request_id: Option<String>,
) -> Result<(), DispatchError> {
    enqueue(store, activation_id, ActivationRequest::Start, request_id)
}

/// Queue a stop of the activation's rulebook process.
pub fn stop_rulebook_process(
    store: &Store,
    activation_id: &ActivationId,
    request_id: Option<String>,
) -> Result<(), DispatchError> {
    enqueue(store, activation_id, ActivationRequest::Stop, request_id)
}

/// Queue a restart of the activation's rulebook process.
pub fn restart_rulebook_process(
    store: &Store,
    activation_id: &ActivationId,
    request_id: Option<String>,
) -> Result<(), DispatchError> {
    enqueue(store, activation_id, ActivationRequest::Restart, request_id)
}

/// Queue deletion of the activation and everything it owns.
pub fn delete_rulebook_process(
    store: &Store,
    activation_id: &ActivationId,
    request_id: Option<String>,
) -> Result<(), DispatchError> {
    enqueue(store, activation_id, ActivationRequest::Delete, request_id)
}

/// Queue a reconciliation pass (scheduler and heartbeat endpoint).
pub fn monitor_rulebook_process(
    store: &Store,
    activation_id: &ActivationId,
) -> Result<(), DispatchError> {
    enqueue(store, activation_id, ActivationRequest::Monitor, None)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
