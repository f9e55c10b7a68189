// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the rulebook worker websocket.
//!
//! Inbound messages are tagged by `type`. The `activation_id` field the
//! worker sends is the *process* id — the id handed to it on its
//! command line — and is typed accordingly here.

use rr_core::ProcessId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    Worker(WorkerHandshake),
    SessionStats(SessionStatsMessage),
    Job(JobMessage),
    AnsibleEvent(AnsibleEventMessage),
    Action(ActionMessage),
}

/// Handshake from a freshly started container.
#[derive(Debug, Deserialize)]
pub struct WorkerHandshake {
    pub activation_id: ProcessId,
}

/// Heartbeat: per-ruleset statistics.
#[derive(Debug, Deserialize)]
pub struct SessionStatsMessage {
    pub activation_id: ProcessId,
    pub stats: serde_json::Value,
    pub reported_at: String,
}

/// The worker is about to run an Ansible job.
#[derive(Debug, Deserialize)]
pub struct JobMessage {
    pub job_id: Uuid,
    pub ansible_rulebook_id: ProcessId,
    pub name: String,
    pub ruleset: String,
    pub rule: String,
    pub hosts: String,
    pub action: String,
}

/// An event emitted by a running job.
#[derive(Debug, Deserialize)]
pub struct AnsibleEventMessage {
    pub event: serde_json::Value,
}

/// A rule firing with its actions and matching events.
#[derive(Debug, Deserialize)]
pub struct ActionMessage {
    pub action: String,
    pub action_uuid: Uuid,
    pub activation_id: ProcessId,
    pub ruleset: String,
    pub rule: String,
    pub ruleset_uuid: Uuid,
    pub rule_uuid: Uuid,
    #[serde(default)]
    pub run_at: Option<String>,
    #[serde(default)]
    pub rule_run_at: Option<String>,
    #[serde(default)]
    pub matching_events: serde_json::Value,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub controller_job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VaultPassword {
    #[serde(rename = "type")]
    pub kind: String,
    pub password: String,
    pub label: String,
}

/// Records sent back for a `Worker` handshake, ending with
/// `EndOfResponse`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    Rulebook { data: String },
    ExtraVars { data: String },
    ControllerInfo { url: String, token: String, ssl_verify: String },
    VaultCollection { data: Vec<VaultPassword> },
    EndOfResponse,
}

/// Rewrite a controller job url onto the gateway.
///
/// `api_url` is the controller host from the activation's credential.
/// The gateway form (`…/api/controller`) gets the execution path; a
/// plain controller host gets the fragment form. An empty controller
/// job id means there is nothing to link and the original url stands.
pub fn rewrite_job_url(
    action_name: &str,
    controller_job_id: &str,
    api_url: &str,
) -> Option<String> {
    if controller_job_id.is_empty() {
        return None;
    }
    let job_type = match action_name {
        "run_job_template" => "playbook",
        "run_workflow_template" => "workflow",
        _ => return None,
    };
    let base = api_url.trim_end_matches('/');
    match base.strip_suffix("/api/controller") {
        Some(gateway) => Some(format!(
            "{gateway}/execution/jobs/{job_type}/{controller_job_id}/details/"
        )),
        None => Some(format!("{base}/#/jobs/{job_type}/{controller_job_id}/details/")),
    }
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
