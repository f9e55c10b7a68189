// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job instances and the audit trail, written by the websocket endpoint.

use super::Store;
use crate::error::StoreError;
use rr_core::{AuditAction, AuditEvent, AuditRule, JobInstance, JobInstanceEvent};
use uuid::Uuid;

impl Store {
    pub fn insert_job_instance(&self, job: JobInstance) -> Result<(), StoreError> {
        self.write(|t| {
            if !t.processes.contains_key(&job.process_id) {
                return Err(StoreError::not_found("process", job.process_id.as_str()));
            }
            t.job_instances.insert(job.uuid, job);
            Ok(())
        })
    }

    pub fn get_job_instance(&self, uuid: &Uuid) -> Option<JobInstance> {
        self.read(|t| t.job_instances.get(uuid).cloned())
    }

    /// Append an event for a job the worker announced earlier. Events for
    /// unknown jobs are an error; the worker always sends `Job` first.
    pub fn append_job_event(&self, event: JobInstanceEvent) -> Result<(), StoreError> {
        self.write(|t| {
            if !t.job_instances.contains_key(&event.job_uuid) {
                return Err(StoreError::not_found("job instance", event.job_uuid.to_string()));
            }
            t.job_events.push(event);
            Ok(())
        })
    }

    pub fn job_event_count(&self, job_uuid: &Uuid) -> usize {
        self.read(|t| t.job_events.iter().filter(|e| &e.job_uuid == job_uuid).count())
    }

    /// Create the rule row on first firing; later firings refresh status
    /// and fired_at.
    pub fn upsert_audit_rule(&self, rule: AuditRule) {
        self.write(|t| {
            t.audit_rules
                .entry(rule.rule_uuid)
                .and_modify(|existing| {
                    existing.status = rule.status.clone();
                    existing.fired_at = rule.fired_at.clone();
                })
                .or_insert(rule);
        });
    }

    /// Insert an action keyed by its worker-assigned uuid. Re-delivery of
    /// the same action is idempotent.
    pub fn insert_audit_action(&self, action: AuditAction) {
        self.write(|t| {
            t.audit_actions.entry(action.action_uuid).or_insert(action);
        });
    }

    pub fn insert_audit_event(&self, event: AuditEvent) {
        self.write(|t| {
            t.audit_events.entry(event.event_uuid).or_insert(event);
        });
    }

    pub fn get_audit_rule(&self, rule_uuid: &Uuid) -> Option<AuditRule> {
        self.read(|t| t.audit_rules.get(rule_uuid).cloned())
    }

    pub fn get_audit_action(&self, action_uuid: &Uuid) -> Option<AuditAction> {
        self.read(|t| t.audit_actions.get(action_uuid).cloned())
    }

    pub fn audit_events_for_action(&self, action_uuid: &Uuid) -> Vec<AuditEvent> {
        self.read(|t| {
            t.audit_events
                .values()
                .filter(|e| &e.action_uuid == action_uuid)
                .cloned()
                .collect()
        })
    }
}
