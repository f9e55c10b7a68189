// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use thiserror::Error;

/// Path the worker dials back into, appended to `WEBSOCKET_BASE_URL`.
pub const ACTIVATION_WS_PATH: &str = "/ws/ansible-rulebook";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid DEPLOYMENT_TYPE {0:?}: expected \"podman\" or \"k8s\"")]
    InvalidDeploymentType(String),
}

/// Which container engine backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentType {
    Podman,
    K8s,
}

rr_core::simple_display! {
    DeploymentType {
        Podman => "podman",
        K8s => "k8s",
    }
}

/// Log flush cadence for container output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushAfter {
    /// Flush every N buffered lines
    Lines(usize),
    /// Flush once, when the handler is flushed explicitly
    End,
}

/// Daemon configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub deployment_type: DeploymentType,
    /// Explicit local-daemon socket; `None` derives it from the uid
    pub podman_socket_url: Option<String>,
    /// STARTING → unresponsive threshold
    pub readiness_timeout_secs: u64,
    /// RUNNING → unresponsive threshold
    pub liveness_timeout_secs: u64,
    /// Worker heartbeat interval, passed on the worker command line
    pub liveness_check_secs: u64,
    /// Restart cap for ON_FAILURE / ALWAYS
    pub max_restarts_on_failure: u32,
    pub restart_secs_on_failure: u64,
    pub restart_secs_on_complete: u64,
    /// Per-worker admission cap; negative = unlimited
    pub max_running_activations: i64,
    pub flush_after: FlushAfter,
    /// Default worker verbosity flag when the activation has none
    pub rulebook_log_level: Option<String>,
    pub allow_force_restart_when_offline: bool,
    pub ws_base_url: String,
    pub ws_ssl_verify: bool,
    /// AAP controller base url, for audit url rewriting
    pub controller_url: Option<String>,
    /// Gateway base url; falls back to `controller_url`
    pub gateway_url: Option<String>,
    pub worker_queues: Vec<String>,
    pub monitor_interval_secs: u64,
    /// Worker-queue liveness window for offline detection
    pub queue_liveness_secs: u64,
    pub k8s_resource_prefix: String,
    pub k8s_namespace_file: PathBuf,
    pub ws_listen_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deployment_type: DeploymentType::Podman,
            podman_socket_url: None,
            readiness_timeout_secs: 120,
            liveness_timeout_secs: 310,
            liveness_check_secs: 300,
            max_restarts_on_failure: 5,
            restart_secs_on_failure: 60,
            restart_secs_on_complete: 0,
            max_running_activations: 5,
            flush_after: FlushAfter::Lines(100),
            rulebook_log_level: Some("-v".to_string()),
            allow_force_restart_when_offline: true,
            ws_base_url: "ws://localhost:8000".to_string(),
            ws_ssl_verify: true,
            controller_url: None,
            gateway_url: None,
            worker_queues: vec!["activation".to_string()],
            monitor_interval_secs: 5,
            queue_liveness_secs: 60,
            k8s_resource_prefix: "activation".to_string(),
            k8s_namespace_file: PathBuf::from(rr_engine::kubernetes::DEFAULT_NAMESPACE_FILE),
            ws_listen_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn bool_or(name: &str, default: bool) -> bool {
    match var(name).as_deref() {
        Some("true") | Some("yes") | Some("1") => true,
        Some("false") | Some("no") | Some("0") => false,
        _ => default,
    }
}

impl Settings {
    /// Read settings from the environment. Only an unrecognized
    /// `DEPLOYMENT_TYPE` is fatal; everything else falls back to its
    /// default.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let deployment_type = match var("DEPLOYMENT_TYPE").as_deref() {
            None | Some("podman") => DeploymentType::Podman,
            Some("k8s") => DeploymentType::K8s,
            Some(other) => return Err(SettingsError::InvalidDeploymentType(other.to_string())),
        };

        let flush_after = match var("ANSIBLE_RULEBOOK_FLUSH_AFTER").as_deref() {
            Some("end") => FlushAfter::End,
            Some(n) => n.parse().map(FlushAfter::Lines).unwrap_or(defaults.flush_after),
            None => defaults.flush_after,
        };

        let worker_queues = var("RULEBOOK_WORKER_QUEUES")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .filter(|queues: &Vec<String>| !queues.is_empty())
            .unwrap_or(defaults.worker_queues);

        Ok(Self {
            deployment_type,
            podman_socket_url: var("PODMAN_SOCKET_URL"),
            readiness_timeout_secs: parse_or(
                "RULEBOOK_READINESS_TIMEOUT_SECONDS",
                defaults.readiness_timeout_secs,
            ),
            liveness_timeout_secs: parse_or(
                "RULEBOOK_LIVENESS_TIMEOUT_SECONDS",
                defaults.liveness_timeout_secs,
            ),
            liveness_check_secs: parse_or(
                "RULEBOOK_LIVENESS_CHECK_SECONDS",
                defaults.liveness_check_secs,
            ),
            max_restarts_on_failure: parse_or(
                "ACTIVATION_MAX_RESTARTS_ON_FAILURE",
                defaults.max_restarts_on_failure,
            ),
            restart_secs_on_failure: parse_or(
                "ACTIVATION_RESTART_SECONDS_ON_FAILURE",
                defaults.restart_secs_on_failure,
            ),
            restart_secs_on_complete: parse_or(
                "ACTIVATION_RESTART_SECONDS_ON_COMPLETE",
                defaults.restart_secs_on_complete,
            ),
            max_running_activations: parse_or(
                "MAX_RUNNING_ACTIVATIONS",
                defaults.max_running_activations,
            ),
            flush_after,
            rulebook_log_level: var("ANSIBLE_RULEBOOK_LOG_LEVEL")
                .or(defaults.rulebook_log_level),
            allow_force_restart_when_offline: bool_or(
                "ALLOW_FORCE_RESTART_WHEN_OFFLINE",
                defaults.allow_force_restart_when_offline,
            ),
            ws_base_url: var("WEBSOCKET_BASE_URL").unwrap_or(defaults.ws_base_url),
            ws_ssl_verify: bool_or("WEBSOCKET_SSL_VERIFY", defaults.ws_ssl_verify),
            controller_url: var("CONTROLLER_URL"),
            gateway_url: var("GATEWAY_URL"),
            worker_queues,
            monitor_interval_secs: parse_or(
                "RULEBOOK_MONITOR_INTERVAL_SECONDS",
                defaults.monitor_interval_secs,
            ),
            queue_liveness_secs: parse_or(
                "RULEBOOK_QUEUE_LIVENESS_SECONDS",
                defaults.queue_liveness_secs,
            ),
            k8s_resource_prefix: var("K8S_RESOURCE_PREFIX")
                .unwrap_or(defaults.k8s_resource_prefix),
            k8s_namespace_file: var("K8S_NAMESPACE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.k8s_namespace_file),
            ws_listen_addr: var("RULEBOOK_WS_LISTEN_ADDR").unwrap_or(defaults.ws_listen_addr),
        })
    }

    /// The websocket url handed to every worker container.
    pub fn ws_url(&self) -> String {
        format!("{}{}", self.ws_base_url.trim_end_matches('/'), ACTIVATION_WS_PATH)
    }

    /// Base url for rewritten audit job urls.
    pub fn gateway_base(&self) -> Option<&str> {
        self.gateway_url.as_deref().or(self.controller_url.as_deref())
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
