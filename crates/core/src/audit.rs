// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Records written from websocket traffic: jobs the worker launches and
//! the audit trail of rule firings.

use crate::id::ProcessId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An Ansible job the rulebook worker is about to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInstance {
    pub uuid: Uuid,
    /// Process that launched the job
    pub process_id: ProcessId,
    pub name: String,
    pub ruleset: String,
    pub action: String,
    pub hosts: String,
}

/// An event emitted by a running job, appended verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInstanceEvent {
    pub job_uuid: Uuid,
    pub counter: u64,
    pub stdout: String,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub created_at: Option<String>,
}

/// A rule that fired at least once for a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRule {
    pub rule_uuid: Uuid,
    pub process_id: ProcessId,
    pub name: String,
    pub ruleset_uuid: Uuid,
    pub ruleset_name: String,
    pub status: String,
    pub fired_at: String,
}

/// One action taken by a fired rule, keyed by the worker-assigned uuid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditAction {
    pub action_uuid: Uuid,
    pub rule_uuid: Uuid,
    pub name: String,
    pub status: String,
    /// Controller url rewritten onto the gateway base
    pub url: String,
    pub fired_at: String,
}

/// A source event that matched the fired rule's condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_uuid: Uuid,
    pub action_uuid: Uuid,
    pub source_name: String,
    pub source_type: String,
    pub payload: serde_json::Value,
    pub received_at: String,
}
