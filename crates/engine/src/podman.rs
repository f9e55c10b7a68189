// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local-daemon backend: drives a rootless or rootful Podman socket
//! through the Podman CLI.
//!
//! Container state is read with `podman inspect` and mapped onto the
//! orchestrator's statuses; logs are read incrementally with
//! `podman logs --timestamps --since` anchored at the process's
//! `log_read_at` cursor.

use crate::error::EngineError;
use crate::logparse::{self, SINCE_MARGIN_SECS};
use crate::messages;
use crate::request::{ContainerRequest, EngineExtra, PullPolicy};
use crate::{ContainerEngine, ContainerStatus, LogHandler};
use async_trait::async_trait;
use rr_core::ProcessStatus;
use serde::Deserialize;

/// Default socket for the invoking user: rootful podman listens on the
/// system path, rootless under the user's runtime directory.
pub fn default_socket_url() -> String {
    let uid = nix::unistd::Uid::effective();
    if uid.is_root() {
        "unix:///run/podman/podman.sock".to_string()
    } else {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/run/user/{uid}"));
        format!("unix://{runtime_dir}/podman/podman.sock")
    }
}

/// Container engine backed by a local Podman daemon.
pub struct PodmanEngine {
    socket_url: String,
}

impl PodmanEngine {
    /// Connect to the daemon, verifying the socket answers.
    pub async fn connect(socket_url: Option<String>) -> Result<Self, EngineError> {
        let socket_url = socket_url.unwrap_or_else(default_socket_url);
        tracing::info!(%socket_url, "using podman socket");
        let engine = Self { socket_url };
        engine
            .podman(&["version", "--format", "{{.Client.Version}}"])
            .await
            .map_err(EngineError::Init)?;
        Ok(engine)
    }

    /// Run a podman CLI command against the configured socket and return
    /// stdout on success.
    async fn podman(&self, args: &[&str]) -> Result<String, String> {
        let output = tokio::process::Command::new("podman")
            .arg("--url")
            .arg(&self.socket_url)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to exec podman: {e}"))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!(
                "podman {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            ))
        }
    }

    /// Like [`Self::podman`] but interleaving stdout and stderr: the
    /// container's stderr lines come back on the CLI's stderr.
    async fn podman_combined(&self, args: &[&str]) -> Result<String, String> {
        let output = tokio::process::Command::new("podman")
            .arg("--url")
            .arg(&self.socket_url)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to exec podman: {e}"))?;

        if output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                if !combined.is_empty() && !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&stderr);
            }
            Ok(combined)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!(
                "podman {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            ))
        }
    }

    async fn container_exists(&self, container_id: &str) -> bool {
        self.podman(&["container", "exists", container_id]).await.is_ok()
    }

    async fn image_exists(&self, image_url: &str) -> bool {
        self.podman(&["image", "exists", image_url]).await.is_ok()
    }

    async fn login(&self, request: &ContainerRequest) -> Result<(), EngineError> {
        let Some(credential) = &request.credential else { return Ok(()) };
        let registry = request.registry();
        let tls = format!("--tls-verify={}", credential.ssl_verify);
        self.podman(&[
            "login",
            &tls,
            "--username",
            &credential.username,
            "--password",
            &credential.secret,
            registry,
        ])
        .await
        .map_err(EngineError::Login)?;
        tracing::debug!(username = %credential.username, %registry, "registry login succeeded");
        Ok(())
    }

    async fn pull_image(
        &self,
        request: &ContainerRequest,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        log_handler.write_message(&format!("Pulling image {}", request.image_url), true)?;
        tracing::info!(image_url = %request.image_url, "pulling image");

        let creds;
        let mut args = vec!["pull"];
        if let Some(credential) = &request.credential {
            creds = format!("{}:{}", credential.username, credential.secret);
            args.extend_from_slice(&["--creds", &creds]);
        }
        args.push(&request.image_url);

        if let Err(e) = self.podman(&args).await {
            let msg = messages::image_pull_error(&request.image_url);
            tracing::error!(image_url = %request.image_url, error = %e, "image pull failed");
            log_handler.write_message(&msg, true)?;
            return Err(EngineError::ImagePull(format!("{msg} {e}")));
        }
        Ok(())
    }

    /// `podman run` arguments for a request, ending with the image url;
    /// the worker command line is appended by the caller.
    fn run_args(request: &ContainerRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--name".to_string(),
            request.name.clone(),
        ];

        for (_, port) in &request.ports {
            args.push("--publish".to_string());
            args.push(format!("{port}:{port}"));
        }
        if let Some(mem_limit) = &request.mem_limit {
            args.push(format!("--memory={mem_limit}"));
        }
        for mount in &request.mounts {
            let ro = if mount.read_only { ":ro" } else { "" };
            args.push("--volume".to_string());
            args.push(format!("{}:{}{}", mount.host_path, mount.container_path, ro));
        }
        for (key, value) in &request.env_vars {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        if let EngineExtra::Podman { extra_args } = &request.extra {
            for (key, value) in extra_args {
                args.push(format!("--{key}={value}"));
            }
        }

        args.push(request.image_url.clone());
        args
    }

    /// Stop and remove the container, tolerating "already gone".
    async fn remove_container(&self, container_id: &str) -> Result<(), EngineError> {
        if !self.container_exists(container_id).await {
            tracing::info!(%container_id, "container not found during cleanup");
            return Ok(());
        }
        self.podman(&["stop", "--ignore", container_id])
            .await
            .map_err(EngineError::Cleanup)?;
        self.podman(&["rm", "--force", "--volumes", container_id])
            .await
            .map_err(EngineError::Cleanup)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "ExitCode")]
    exit_code: Option<i64>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

/// Map a podman container state onto the orchestrator statuses.
///
/// State names per libpod's containerstate definitions.
fn map_state(container_id: &str, state: &InspectState) -> ContainerStatus {
    match state.status.as_str() {
        "exited" | "stopped" => {
            let exit_code = state.exit_code.unwrap_or(-1);
            if exit_code == 0 {
                ContainerStatus::new(
                    ProcessStatus::Completed,
                    messages::pod_completed(container_id),
                )
            } else {
                let message = match state.error.as_deref() {
                    Some(error) if !error.is_empty() => error.to_string(),
                    _ => messages::pod_generic_fail(container_id, exit_code),
                };
                ContainerStatus::new(ProcessStatus::Failed, message)
            }
        }
        "running" | "stopping" => {
            ContainerStatus::new(ProcessStatus::Running, messages::pod_running(container_id))
        }
        // Created but never started: the engine error, when podman
        // recorded one, beats the generic message.
        "created" => {
            let message = match state.error.as_deref() {
                Some(error) if !error.is_empty() => error.to_string(),
                _ => messages::pod_not_running(container_id),
            };
            ContainerStatus::new(ProcessStatus::Failed, message)
        }
        "paused" | "restarting" | "removing" | "dead" | "configured" | "unknown" => {
            ContainerStatus::new(
                ProcessStatus::Failed,
                messages::pod_wrong_state(container_id, &state.status),
            )
        }
        // Undocumented status, fail safe
        other => ContainerStatus::new(
            ProcessStatus::Error,
            messages::pod_unexpected(container_id, other),
        ),
    }
}

#[async_trait]
impl ContainerEngine for PodmanEngine {
    async fn start(
        &self,
        request: &ContainerRequest,
        log_handler: &dyn LogHandler,
    ) -> Result<String, EngineError> {
        if request.image_url.is_empty() {
            return Err(EngineError::Start("missing image url".to_string()));
        }

        self.login(request).await?;

        if request.pull_policy == PullPolicy::Always
            || (request.pull_policy == PullPolicy::IfNotPresent
                && !self.image_exists(&request.image_url).await)
        {
            self.pull_image(request, log_handler).await?;
        }

        log_handler.write_message("Starting Container", true)?;
        let command = request.cmdline.command_and_args();
        log_handler.write_message(&format!("Container args {command:?}"), true)?;

        let mut args = Self::run_args(request);
        args.extend(command);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        tracing::info!(name = %request.name, image_url = %request.image_url, "creating container");
        let container_id = self.podman(&arg_refs).await.map_err(|e| {
            let message = format!("Container Start Error: {e}");
            tracing::error!(name = %request.name, error = %e, "container start failed");
            let _ = log_handler.write_message(&message, true);
            EngineError::Start(message)
        })?;

        log_handler.write_message(&format!("Container {container_id} is started."), true)?;
        tracing::info!(%container_id, name = %request.name, "container started");
        Ok(container_id)
    }

    async fn get_status(&self, container_id: &str) -> Result<ContainerStatus, EngineError> {
        if !self.container_exists(container_id).await {
            return Err(EngineError::NotFound(format!(
                "Container id {container_id} not found"
            )));
        }
        let raw = self
            .podman(&[
                "inspect",
                "--type",
                "container",
                "--format",
                "{{json .State}}",
                container_id,
            ])
            .await
            .map_err(EngineError::Engine)?;
        let state: InspectState = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Engine(format!("unparseable inspect output: {e}")))?;
        Ok(map_state(container_id, &state))
    }

    async fn update_logs(
        &self,
        container_id: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        if !self.container_exists(container_id).await {
            tracing::warn!(%container_id, "container not found while updating logs");
            log_handler.write_message(&format!("Container {container_id} not found."), true)?;
            return Ok(());
        }

        let mut args = vec!["logs".to_string(), "--timestamps".to_string()];
        if let Some(cursor_ms) = log_handler.get_log_read_at() {
            let since_secs = (cursor_ms / 1000).saturating_sub(SINCE_MARGIN_SECS);
            args.push("--since".to_string());
            args.push(since_secs.to_string());
        }
        args.push(container_id.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let raw = self
            .podman_combined(&arg_refs)
            .await
            .map_err(EngineError::UpdateLogs)?;
        logparse::apply_raw_logs(&raw, log_handler)?;
        Ok(())
    }

    async fn cleanup(
        &self,
        container_id: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        if self.container_exists(container_id).await {
            self.podman(&["stop", "--ignore", container_id])
                .await
                .map_err(EngineError::Cleanup)?;
            // Final log read before the container is removed.
            self.update_logs(container_id, log_handler).await?;
            self.remove_container(container_id).await?;
            log_handler.write_message(&format!("Container {container_id} is cleaned up."), true)?;
            tracing::info!(%container_id, "container cleaned up");
        } else {
            tracing::info!(%container_id, "container not found");
            log_handler.write_message(&format!("Container {container_id} not found."), true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "podman_tests.rs"]
mod tests;
