// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The activation record: user-declared desired state for a rulebook worker.

use crate::id::{ActivationId, ProcessId};
use crate::status::ProcessStatus;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What to do when a rulebook process leaves on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Terminal on any exit
    Never,
    /// Restart on failure, capped by the configured maximum
    OnFailure,
    /// Restart on failure (capped) and on clean exit (uncapped)
    Always,
}

crate::simple_display! {
    RestartPolicy {
        Never => "never",
        OnFailure => "on-failure",
        Always => "always",
    }
}

/// Registry credential used to log in and pull the decision environment
/// image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub username: String,
    pub secret: String,
    pub ssl_verify: bool,
}

/// The container image a rulebook worker runs in, plus its registry
/// credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEnvironment {
    pub image_url: String,
    pub credential: Option<RegistryCredential>,
}

/// Credentials resolved for the running worker and handed over during the
/// websocket handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationCredential {
    /// Automation controller access for run_job_template / run_workflow_template
    Controller { url: String, token: String, ssl_verify: bool },
    /// Vault password for decrypting inventory/extra vars
    VaultPassword { label: String, password: String },
}

/// Desired state: a rulebook that should be running in a container with
/// the given credentials and policy.
///
/// Mutated only by the orchestrator core, except for user edits to config
/// fields which the API layer guards with "must be disabled AND in a
/// terminal status".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub id: ActivationId,
    /// Unique, user-chosen
    pub name: String,
    pub is_enabled: bool,
    pub restart_policy: RestartPolicy,
    pub status: ProcessStatus,
    pub status_message: String,
    pub status_updated_at_ms: u64,
    /// Consecutive failures since the last RUNNING transition
    pub failure_count: u32,
    /// Lifetime restarts driven by policy or user
    pub restart_count: u32,
    /// Weak reference to the most recent process; invariant: the process's
    /// parent is this activation
    pub latest_process: Option<ProcessId>,
    /// Rulebook YAML text, parsed here only for port extraction
    pub rulebook_rulesets: String,
    pub decision_environment: Option<DecisionEnvironment>,
    pub credentials: Vec<ActivationCredential>,
    /// Extra vars YAML handed to the worker during the handshake
    pub extra_var: Option<String>,
    /// Kubernetes service to expose the rulebook's source ports
    pub k8s_service_name: Option<String>,
    /// Verbosity flag propagated to the worker command line (`-v`, `-vv`)
    pub log_level: Option<String>,
    pub skip_audit_events: bool,
    pub organization: String,
    /// Project revision snapshot copied onto each process
    pub git_hash: String,
    /// Per-ruleset statistics merged from worker heartbeats
    pub ruleset_stats: IndexMap<String, serde_json::Value>,
}

impl Activation {
    /// Create a new enabled activation in PENDING.
    pub fn new(name: impl Into<String>, rulebook_rulesets: impl Into<String>) -> Self {
        Self {
            id: ActivationId::new(),
            name: name.into(),
            is_enabled: true,
            restart_policy: RestartPolicy::OnFailure,
            status: ProcessStatus::Pending,
            status_message: String::new(),
            status_updated_at_ms: 0,
            failure_count: 0,
            restart_count: 0,
            latest_process: None,
            rulebook_rulesets: rulebook_rulesets.into(),
            decision_environment: None,
            credentials: Vec::new(),
            extra_var: None,
            k8s_service_name: None,
            log_level: None,
            skip_audit_events: false,
            organization: String::new(),
            git_hash: String::new(),
            ruleset_stats: IndexMap::new(),
        }
    }

    /// The controller credential, when one is configured.
    pub fn controller_credential(&self) -> Option<&ActivationCredential> {
        self.credentials
            .iter()
            .find(|c| matches!(c, ActivationCredential::Controller { .. }))
    }

    /// Vault passwords, in configuration order.
    pub fn vault_passwords(&self) -> Vec<&ActivationCredential> {
        self.credentials
            .iter()
            .filter(|c| matches!(c, ActivationCredential::VaultPassword { .. }))
            .collect()
    }
}

crate::builder! {
    pub struct ActivationBuilder => Activation {
        into {
            name: String = "test-activation",
            status_message: String = "",
            rulebook_rulesets: String = "---\n- name: test\n  sources: []\n",
            organization: String = "default",
            git_hash: String = "",
        }
        set {
            is_enabled: bool = true,
            restart_policy: RestartPolicy = RestartPolicy::Never,
            status: ProcessStatus = ProcessStatus::Pending,
            status_updated_at_ms: u64 = 0,
            failure_count: u32 = 0,
            restart_count: u32 = 0,
            credentials: Vec<ActivationCredential> = Vec::new(),
            skip_audit_events: bool = false,
            ruleset_stats: IndexMap<String, serde_json::Value> = IndexMap::new(),
        }
        option {
            latest_process: ProcessId = None,
            decision_environment: DecisionEnvironment = Some(DecisionEnvironment {
                image_url: "quay.io/ansible/ansible-rulebook:main".to_string(),
                credential: None,
            }),
            extra_var: String = None,
            k8s_service_name: String = None,
            log_level: String = None,
        }
        computed {
            id: ActivationId = ActivationId::new(),
        }
    }
}

#[cfg(test)]
#[path = "activation_tests.rs"]
mod tests;
