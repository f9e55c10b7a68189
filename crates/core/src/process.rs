// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The rulebook process record: one attempt to run an activation.

use crate::id::{ActivationId, ProcessId};
use crate::status::ProcessStatus;
use serde::{Deserialize, Serialize};

/// One run of an activation, mapping 1:1 to a container or Pod.
///
/// Created by the activation manager when a run starts, updated by the
/// manager and the heartbeat endpoint, and retained as history for as long
/// as the activation exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulebookProcess {
    pub id: ProcessId,
    pub activation_id: ActivationId,
    /// Snapshot of the activation name at creation
    pub name: String,
    pub status: ProcessStatus,
    pub status_message: String,
    pub started_at_ms: u64,
    /// Stamped by the heartbeat endpoint; `None` until the first heartbeat
    pub updated_at_ms: Option<u64>,
    /// Set when the process reaches a terminal status
    pub ended_at_ms: Option<u64>,
    /// Engine-assigned container/job handle; opaque to everything but the
    /// engine backend. Cleared when the process reaches a terminal status.
    pub activation_pod_id: Option<String>,
    /// Monotonic cursor into the container logs, epoch milliseconds
    pub log_read_at_ms: Option<u64>,
    /// Project revision the activation had when this run started
    pub git_hash: String,
    /// Ansible job currently launched by the worker, if any
    pub current_job_id: Option<String>,
}

impl RulebookProcess {
    /// Create a new process in STARTING for the given activation.
    pub fn new(activation_id: ActivationId, name: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: ProcessId::new(),
            activation_id,
            name: name.into(),
            status: ProcessStatus::Starting,
            status_message: String::new(),
            started_at_ms: now_ms,
            updated_at_ms: None,
            ended_at_ms: None,
            activation_pod_id: None,
            log_read_at_ms: None,
            git_hash: String::new(),
            current_job_id: None,
        }
    }

    /// Whether at least one heartbeat has been observed for this run.
    pub fn has_heartbeat(&self) -> bool {
        self.updated_at_ms.is_some()
    }
}

crate::builder! {
    pub struct RulebookProcessBuilder => RulebookProcess {
        into {
            name: String = "test-activation",
            status_message: String = "",
            git_hash: String = "",
        }
        set {
            activation_id: ActivationId = ActivationId::new(),
            status: ProcessStatus = ProcessStatus::Starting,
            started_at_ms: u64 = 1_000_000,
        }
        option {
            updated_at_ms: u64 = None,
            ended_at_ms: u64 = None,
            activation_pod_id: String = None,
            log_read_at_ms: u64 = None,
            current_job_id: String = None,
        }
        computed {
            id: ProcessId = ProcessId::new(),
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
