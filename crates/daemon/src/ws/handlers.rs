// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message handling for the rulebook worker websocket.
//!
//! Each inbound message is handled independently against the store —
//! there is no per-connection state beyond the socket itself. This is
//! the only component that writes `RulebookProcess.updated_at` and
//! `Activation.ruleset_stats`.

use super::messages::{
    ActionMessage, AnsibleEventMessage, InboundMessage, JobMessage, OutboundMessage,
    SessionStatsMessage, VaultPassword, WorkerHandshake,
};
use crate::dispatch;
use crate::env::Settings;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rr_core::{
    ActivationCredential, AuditAction, AuditEvent, AuditRule, Clock, JobInstance,
    JobInstanceEvent, ProcessStatus,
};
use rr_storage::Store;
use uuid::Uuid;

pub struct MessageContext<C: Clock> {
    store: Store,
    settings: Settings,
    clock: C,
}

impl<C: Clock> MessageContext<C> {
    pub fn new(store: Store, settings: Settings, clock: C) -> Self {
        Self { store, settings, clock }
    }

    /// Handle one inbound message; the returned records go back over the
    /// socket in order.
    pub fn handle(&self, message: InboundMessage) -> Vec<OutboundMessage> {
        match message {
            InboundMessage::Worker(handshake) => self.handle_worker(handshake),
            InboundMessage::SessionStats(stats) => {
                self.handle_session_stats(stats);
                Vec::new()
            }
            InboundMessage::Job(job) => {
                self.handle_job(job);
                Vec::new()
            }
            InboundMessage::AnsibleEvent(event) => {
                self.handle_ansible_event(event);
                Vec::new()
            }
            InboundMessage::Action(action) => {
                self.handle_action(action);
                Vec::new()
            }
        }
    }

    /// Respond to a worker handshake with the activation's payload:
    /// rulebook, extra vars, controller access, vault passwords, then
    /// the end marker.
    fn handle_worker(&self, handshake: WorkerHandshake) -> Vec<OutboundMessage> {
        let process_id = handshake.activation_id;
        tracing::info!(%process_id, "worker connected");

        let Ok(process) = self.store.get_process(&process_id) else {
            tracing::warn!(%process_id, "handshake for unknown process");
            return Vec::new();
        };
        let Ok(activation) = self.store.get_activation(&process.activation_id) else {
            tracing::warn!(%process_id, "handshake for deleted activation");
            return Vec::new();
        };

        let mut responses = vec![OutboundMessage::Rulebook {
            data: BASE64.encode(&activation.rulebook_rulesets),
        }];

        if let Some(extra_var) = &activation.extra_var {
            responses.push(OutboundMessage::ExtraVars { data: BASE64.encode(extra_var) });
        }

        if let Some(ActivationCredential::Controller { url, token, ssl_verify }) =
            activation.controller_credential()
        {
            responses.push(OutboundMessage::ControllerInfo {
                url: url.clone(),
                token: token.clone(),
                ssl_verify: if *ssl_verify { "yes" } else { "no" }.to_string(),
            });
        }

        let vaults: Vec<VaultPassword> = activation
            .vault_passwords()
            .into_iter()
            .filter_map(|c| match c {
                ActivationCredential::VaultPassword { label, password } => Some(VaultPassword {
                    kind: "VaultPassword".to_string(),
                    password: password.clone(),
                    label: label.clone(),
                }),
                _ => None,
            })
            .collect();
        if !vaults.is_empty() {
            responses.push(OutboundMessage::VaultCollection { data: vaults });
        }

        responses.push(OutboundMessage::EndOfResponse);
        responses
    }

    /// Heartbeat: merge ruleset stats, stamp `updated_at`, and kick a
    /// monitor when the activation is waiting on its first heartbeat.
    fn handle_session_stats(&self, message: SessionStatsMessage) {
        let process_id = message.activation_id;
        let reported_at_ms = chrono::DateTime::parse_from_rfc3339(&message.reported_at)
            .ok()
            .and_then(|dt| u64::try_from(dt.timestamp_millis()).ok())
            .unwrap_or_else(|| self.clock.epoch_ms());

        let process = match self
            .store
            .update_process(&process_id, |p| p.updated_at_ms = Some(reported_at_ms))
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(%process_id, error = %e, "heartbeat for unknown process");
                return;
            }
        };

        let ruleset_name = message
            .stats
            .get("ruleSetName")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let stats = message.stats.clone();
        let activation = match self.store.update_activation(&process.activation_id, |a| {
            a.ruleset_stats.insert(ruleset_name.clone(), stats.clone());
        }) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(%process_id, error = %e, "heartbeat for deleted activation");
                return;
            }
        };
        tracing::debug!(%process_id, ruleset = %ruleset_name, "heartbeat merged");

        // Drive the STARTING→RUNNING transition promptly.
        if activation.status == ProcessStatus::Starting {
            if let Err(e) = dispatch::monitor_rulebook_process(&self.store, &activation.id) {
                tracing::warn!(activation_id = %activation.id, error = %e, "monitor kick failed");
            }
        }
    }

    fn handle_job(&self, message: JobMessage) {
        let process_id = message.ansible_rulebook_id;
        let job = JobInstance {
            uuid: message.job_id,
            process_id: process_id.clone(),
            name: message.name,
            ruleset: message.ruleset,
            action: message.action,
            hosts: message.hosts,
        };
        if let Err(e) = self.store.insert_job_instance(job) {
            tracing::warn!(%process_id, error = %e, "job instance rejected");
            return;
        }
        let _ = self
            .store
            .update_process(&process_id, |p| p.current_job_id = Some(message.job_id.to_string()));
        tracing::info!(%process_id, job_uuid = %message.job_id, "job instance created");
    }

    fn handle_ansible_event(&self, message: AnsibleEventMessage) {
        let event = &message.event;
        let Some(job_uuid) = event
            .get("job_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            tracing::warn!("ansible event without job_id");
            return;
        };
        let row = JobInstanceEvent {
            job_uuid,
            counter: event.get("counter").and_then(|v| v.as_u64()).unwrap_or(0),
            stdout: event
                .get("stdout")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            event_type: event.get("event").and_then(|v| v.as_str()).map(str::to_string),
            created_at: event.get("created").and_then(|v| v.as_str()).map(str::to_string),
        };
        if let Err(e) = self.store.append_job_event(row) {
            tracing::warn!(%job_uuid, error = %e, "job event rejected");
        }
    }

    /// A rule firing: upsert the rule, insert the action (with its url
    /// rewritten onto the gateway), and record the matching events.
    fn handle_action(&self, message: ActionMessage) {
        let process_id = message.activation_id.clone();
        let fired_at = message
            .rule_run_at
            .clone()
            .or_else(|| message.run_at.clone())
            .unwrap_or_default();
        let status = message.status.clone().unwrap_or_default();

        self.store.upsert_audit_rule(AuditRule {
            rule_uuid: message.rule_uuid,
            process_id: process_id.clone(),
            name: message.rule.clone(),
            ruleset_uuid: message.ruleset_uuid,
            ruleset_name: message.ruleset.clone(),
            status: status.clone(),
            fired_at: fired_at.clone(),
        });

        let url = self.rewritten_url(&message);
        self.store.insert_audit_action(AuditAction {
            action_uuid: message.action_uuid,
            rule_uuid: message.rule_uuid,
            name: message.action.clone(),
            status,
            url,
            fired_at,
        });

        if let Some(events) = message.matching_events.as_object() {
            for event in events.values() {
                let Some(meta) = event.get("meta") else { continue };
                let Some(event_uuid) = meta
                    .get("uuid")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                else {
                    continue;
                };
                self.store.insert_audit_event(AuditEvent {
                    event_uuid,
                    action_uuid: message.action_uuid,
                    source_name: meta
                        .get("source")
                        .and_then(|s| s.get("name"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    source_type: meta
                        .get("source")
                        .and_then(|s| s.get("type"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    payload: event.clone(),
                    received_at: meta
                        .get("received_at")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }
        tracing::info!(
            %process_id,
            action_uuid = %message.action_uuid,
            rule = %message.rule,
            "audit action recorded"
        );
    }

    /// The controller host for rewriting comes from the activation's
    /// credential, falling back to the configured gateway.
    fn rewritten_url(&self, message: &ActionMessage) -> String {
        let original = message.url.clone().unwrap_or_default();
        let Some(controller_job_id) = message.controller_job_id.as_deref() else {
            return original;
        };

        let api_url = self
            .store
            .get_process(&message.activation_id)
            .ok()
            .and_then(|p| self.store.get_activation(&p.activation_id).ok())
            .and_then(|a| match a.controller_credential() {
                Some(ActivationCredential::Controller { url, .. }) => Some(url.clone()),
                _ => None,
            })
            .or_else(|| self.settings.gateway_base().map(str::to_string));

        match api_url {
            Some(api_url) => {
                super::messages::rewrite_job_url(&message.action, controller_job_id, &api_url)
                    .unwrap_or(original)
            }
            None => original,
        }
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
