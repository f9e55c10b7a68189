// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The status manager: the single writer of status fields on an
//! activation and its latest process.
//!
//! Every write happens under the activation's row lock and is checked
//! against the transition table. The lock is held only for the duration
//! of the write; the lifecycle has long suspension points between
//! reading and writing state, and two workers racing a `monitor`
//! against a `disable` must not overwrite each other.

use rr_core::{Activation, ActivationId, Clock, ProcessStatus, RulebookProcess};
use rr_storage::{RowLock, Store, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("invalid status transition {from} -> {to} for {kind} {id}")]
    InvalidTransition {
        kind: &'static str,
        id: String,
        from: ProcessStatus,
        to: ProcessStatus,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct StatusManager<C: Clock> {
    store: Store,
    activation_id: ActivationId,
    clock: C,
}

impl<C: Clock> StatusManager<C> {
    pub fn new(store: Store, activation_id: ActivationId, clock: C) -> Self {
        Self { store, activation_id, clock }
    }

    /// Set the activation status under a freshly acquired row lock.
    pub async fn set_status(
        &self,
        status: ProcessStatus,
        message: Option<&str>,
    ) -> Result<Activation, StatusError> {
        let row = self.store.lock_row(&self.activation_id).await;
        self.set_status_with(&row, status, message)
    }

    /// Set the activation status while the caller already holds the row
    /// lock (for compound writes like the STARTING→RUNNING promotion).
    pub fn set_status_with(
        &self,
        _row: &RowLock,
        status: ProcessStatus,
        message: Option<&str>,
    ) -> Result<Activation, StatusError> {
        let current = self.store.get_activation(&self.activation_id)?;
        if !current.status.may_transition(status) {
            return Err(StatusError::InvalidTransition {
                kind: "activation",
                id: self.activation_id.as_str().to_string(),
                from: current.status,
                to: status,
            });
        }
        let now = self.clock.epoch_ms();
        let updated = self.store.update_activation(&self.activation_id, |a| {
            a.status = status;
            a.status_updated_at_ms = now;
            if let Some(message) = message {
                a.status_message = message.to_string();
            }
        })?;
        tracing::debug!(
            activation_id = %self.activation_id,
            from = %current.status,
            to = %status,
            "activation status updated"
        );
        Ok(updated)
    }

    /// Set the latest process's status under a freshly acquired row lock.
    pub async fn set_latest_instance_status(
        &self,
        status: ProcessStatus,
        message: Option<&str>,
    ) -> Result<RulebookProcess, StatusError> {
        let row = self.store.lock_row(&self.activation_id).await;
        self.set_latest_instance_status_with(&row, status, message)
    }

    /// Same, with the row lock already held.
    ///
    /// Terminal transitions finalize the row: `ended_at` is stamped and
    /// the engine handle is cleared (a terminal process owns no
    /// container). Leaving RUNNING clears `current_job_id`.
    pub fn set_latest_instance_status_with(
        &self,
        _row: &RowLock,
        status: ProcessStatus,
        message: Option<&str>,
    ) -> Result<RulebookProcess, StatusError> {
        let process = self
            .store
            .latest_process(&self.activation_id)?
            .ok_or_else(|| StoreError::not_found("latest process", self.activation_id.as_str()))?;
        if !process.status.may_transition(status) {
            return Err(StatusError::InvalidTransition {
                kind: "process",
                id: process.id.as_str().to_string(),
                from: process.status,
                to: status,
            });
        }
        let now = self.clock.epoch_ms();
        let updated = self.store.update_process(&process.id, |p| {
            p.status = status;
            if let Some(message) = message {
                p.status_message = message.to_string();
            }
            if status.is_terminal() {
                p.ended_at_ms = Some(now);
                p.activation_pod_id = None;
            }
            if status != ProcessStatus::Running {
                p.current_job_id = None;
            }
        })?;
        tracing::debug!(
            process_id = %process.id,
            from = %process.status,
            to = %status,
            "process status updated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
