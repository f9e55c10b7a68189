// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The container request: everything a backend needs to run one
//! rulebook worker.

use rr_core::{ActivationId, ProcessId, RegistryCredential};

/// Image pull policy, mapped to each backend's native spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullPolicy {
    #[default]
    Always,
    IfNotPresent,
    Never,
}

rr_core::simple_display! {
    PullPolicy {
        Always => "Always",
        IfNotPresent => "IfNotPresent",
        Never => "Never",
    }
}

/// A host path mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// The rulebook worker invocation.
///
/// The worker dials back into the orchestrator over the websocket url,
/// identifies itself with the process id, and heartbeats on the given
/// interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCmdline {
    pub ws_url: String,
    pub ws_ssl_verify: bool,
    pub process_id: ProcessId,
    pub heartbeat_secs: u64,
    /// Verbosity flag (`-v`, `-vv`); omitted when `None`
    pub log_level: Option<String>,
    pub skip_audit_events: bool,
}

impl WorkerCmdline {
    pub fn command(&self) -> &'static str {
        "ansible-rulebook"
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--worker".to_string(),
            "--websocket-ssl-verify".to_string(),
            if self.ws_ssl_verify { "yes" } else { "no" }.to_string(),
            "--websocket-address".to_string(),
            self.ws_url.clone(),
            "--id".to_string(),
            self.process_id.as_str().to_string(),
            "--heartbeat".to_string(),
            self.heartbeat_secs.to_string(),
        ];
        if self.skip_audit_events {
            args.push("--skip-audit-events".to_string());
        }
        if let Some(level) = &self.log_level {
            args.push(level.clone());
        }
        args
    }

    /// Full command line, for backends that take a single argv.
    pub fn command_and_args(&self) -> Vec<String> {
        let mut argv = vec![self.command().to_string()];
        argv.extend(self.to_args());
        argv
    }
}

/// Backend-specific request fields. The manager fills the variant
/// matching the engine it was constructed with; backends ignore foreign
/// variants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineExtra {
    #[default]
    None,
    Podman {
        /// Raw flags appended to `podman run`
        extra_args: Vec<(String, String)>,
    },
    Kubernetes {
        /// Service exposing the rulebook's source ports
        service_name: Option<String>,
    },
}

/// Everything needed to run one rulebook worker container.
#[derive(Debug, Clone)]
pub struct ContainerRequest {
    /// Display name for the container
    pub name: String,
    pub image_url: String,
    pub pull_policy: PullPolicy,
    pub cmdline: WorkerCmdline,
    pub credential: Option<RegistryCredential>,
    /// `(host, port)` pairs extracted from the rulebook sources
    pub ports: Vec<(Option<String>, u16)>,
    pub mem_limit: Option<String>,
    pub mounts: Vec<BindMount>,
    pub env_vars: Vec<(String, String)>,
    pub extra: EngineExtra,
    /// Parent activation; used for backend resource naming
    pub parent_id: ActivationId,
    pub process_id: ProcessId,
}

impl ContainerRequest {
    /// Registry host, the first path segment of the image url.
    pub fn registry(&self) -> &str {
        self.image_url.split('/').next().unwrap_or(&self.image_url)
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
