// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store proper.
//!
//! # Module layout
//!
//! - [`activations`] — activation table
//! - [`processes`] — process table, queue pinning, latest-process upkeep
//! - [`queue`] — the request FIFO with coalescing claims
//! - [`logs`] — append-only process logs with millisecond dedup keys
//! - [`audit`] — job instances and the audit trail

mod activations;
mod audit;
mod logs;
mod processes;
mod queue;

use parking_lot::{Mutex, RwLock};
use rr_core::{
    ActivationId, AuditAction, AuditEvent, AuditRule, JobInstance, JobInstanceEvent, ProcessId,
    QueuedRequest, RulebookProcess,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// One stored log line. `log_timestamp_ms` is the engine-reported
/// timestamp and the dedup key; the human-visible timestamp truncates it
/// to whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLogLine {
    pub process_id: ProcessId,
    pub line: String,
    pub log_timestamp_ms: u64,
}

impl ProcessLogLine {
    /// Second-resolution timestamp for display and API reads.
    pub fn log_timestamp_secs(&self) -> u64 {
        self.log_timestamp_ms / 1000
    }
}

#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) activations: HashMap<ActivationId, rr_core::Activation>,
    pub(crate) processes: HashMap<ProcessId, RulebookProcess>,
    /// Process → worker queue pinning, assigned at creation
    pub(crate) process_queue: HashMap<ProcessId, String>,
    /// FIFO request rows, ordered by id
    pub(crate) requests: Vec<QueuedRequest>,
    pub(crate) logs: HashMap<ProcessId, Vec<ProcessLogLine>>,
    /// Last liveness report per worker queue, epoch ms
    pub(crate) queue_liveness: HashMap<String, u64>,
    pub(crate) job_instances: HashMap<Uuid, JobInstance>,
    pub(crate) job_events: Vec<JobInstanceEvent>,
    pub(crate) audit_rules: HashMap<Uuid, AuditRule>,
    pub(crate) audit_actions: HashMap<Uuid, AuditAction>,
    pub(crate) audit_events: HashMap<Uuid, AuditEvent>,
}

struct Inner {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<ActivationId, Arc<tokio::sync::Mutex<()>>>>,
    wakes: Mutex<HashMap<String, Arc<Notify>>>,
    next_request_id: AtomicU64,
}

/// Held for the duration of a read-modify-write sequence on one
/// activation. Dropping releases the row.
#[must_use = "a row lock protects nothing once dropped"]
pub struct RowLock {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

/// Handle to the record store. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                wakes: Mutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.inner.tables.read())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        f(&mut self.inner.tables.write())
    }

    pub(crate) fn next_request_id(&self) -> u64 {
        self.inner
            .next_request_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Acquire the row lock for an activation.
    ///
    /// Serializes writers of one activation against each other; readers
    /// and other rows are unaffected. Callers must not hold this across
    /// an engine call.
    pub async fn lock_row(&self, id: &ActivationId) -> RowLock {
        let mutex = {
            let mut locks = self.inner.row_locks.lock();
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        RowLock { _guard: mutex.lock_owned().await }
    }

    fn wake_handle(&self, queue_name: &str) -> Arc<Notify> {
        let mut wakes = self.inner.wakes.lock();
        Arc::clone(wakes.entry(queue_name.to_string()).or_default())
    }

    /// Register a worker queue so `wake_all` reaches it before its first
    /// wait.
    pub fn register_queue(&self, queue_name: &str) {
        let _ = self.wake_handle(queue_name);
    }

    /// Nudge the worker serving `queue_name`.
    pub fn wake(&self, queue_name: &str) {
        self.wake_handle(queue_name).notify_one();
    }

    /// Nudge every registered worker queue (first start of an unpinned
    /// activation).
    pub fn wake_all(&self) {
        let handles: Vec<Arc<Notify>> =
            self.inner.wakes.lock().values().map(Arc::clone).collect();
        for handle in handles {
            handle.notify_one();
        }
    }

    /// Wait until woken or until `timeout` elapses, whichever is first.
    pub async fn wait_for_wake(&self, queue_name: &str, timeout: Duration) {
        let handle = self.wake_handle(queue_name);
        let _ = tokio::time::timeout(timeout, handle.notified()).await;
    }

    /// Record that the worker serving `queue_name` is alive.
    pub fn record_queue_liveness(&self, queue_name: &str, now_ms: u64) {
        self.write(|t| {
            t.queue_liveness.insert(queue_name.to_string(), now_ms);
        });
    }

    /// Worker queues that have not reported liveness within the window.
    pub fn stale_queues(&self, now_ms: u64, window_ms: u64) -> Vec<String> {
        self.read(|t| {
            t.queue_liveness
                .iter()
                .filter(|(_, &seen)| now_ms.saturating_sub(seen) > window_ms)
                .map(|(name, _)| name.clone())
                .collect()
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
