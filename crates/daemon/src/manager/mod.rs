// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The activation manager: owner of the lifecycle operations.
//!
//! A manager instance is short-lived — constructed per worker task for
//! one activation and one engine — and is the only component permitted
//! to mutate running containers. Status writes go through the
//! [`StatusManager`]; restart scheduling goes through the request queue
//! as a delayed AUTO_START, never an in-process timer.
//!
//! # Module layout
//!
//! - [`policy`] — the restart policies (failed / completed /
//!   unresponsive / missing container)

pub mod policy;

use crate::env::{DeploymentType, Settings};
use crate::logger::DbLogger;
use crate::status::{StatusError, StatusManager};
use rr_core::{
    find_ports, requires_controller_token, Activation, ActivationId, ActivationRequest, Clock,
    ProcessId, ProcessStatus, RulebookProcess,
};
use rr_engine::{
    ContainerEngine, ContainerRequest, EngineError, EngineExtra, LogHandler, PullPolicy,
    WorkerCmdline,
};
use rr_storage::{Store, StoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("activation start failed: {0}")]
    Start(String),
    #[error("activation stop failed: {0}")]
    Stop(String),
    #[error("activation delete failed: {0}")]
    Delete(String),
    #[error("activation monitor failed: {0}")]
    Monitor(String),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ActivationManager<C: Clock> {
    store: Store,
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
    /// Worker queue executing this manager; new processes get pinned here
    queue_name: String,
    activation_id: ActivationId,
    clock: C,
    status: StatusManager<C>,
}

impl<C: Clock> ActivationManager<C> {
    pub fn new(
        store: Store,
        engine: Arc<dyn ContainerEngine>,
        settings: Settings,
        queue_name: impl Into<String>,
        activation_id: ActivationId,
        clock: C,
    ) -> Self {
        let status = StatusManager::new(store.clone(), activation_id.clone(), clock.clone());
        Self {
            store,
            engine,
            settings,
            queue_name: queue_name.into(),
            activation_id,
            clock,
            status,
        }
    }

    // ── lifecycle operations ─────────────────────────────────────────

    /// Start the activation, idempotently. Called for user starts and,
    /// with `is_restart`, for AUTO_STARTs produced by restart policy.
    pub async fn start(&self, is_restart: bool) -> Result<(), ManagerError> {
        tracing::info!(activation_id = %self.activation_id, is_restart, "start requested");

        self.check_start_prerequirements().await?;

        if self.is_already_running().await? {
            tracing::info!(activation_id = %self.activation_id, "already running");
            return Ok(());
        }

        let started = self.start_instance().await?;
        if started && is_restart {
            let _row = self.store.lock_row(&self.activation_id).await;
            self.store
                .update_activation(&self.activation_id, |a| a.restart_count += 1)?;
        }
        Ok(())
    }

    /// Stop the activation and finalize its latest process. Preserves an
    /// ERROR status on the activation; cancels any scheduled restart.
    pub async fn stop(&self) -> Result<(), ManagerError> {
        tracing::info!(activation_id = %self.activation_id, "stop requested");

        let activation = self
            .activation()
            .map_err(|_| ManagerError::Stop("The Activation does not exist.".to_string()))?;

        self.store.cancel_auto_starts(&self.activation_id);

        let Some(process) = self.store.latest_process(&self.activation_id)? else {
            tracing::info!(activation_id = %self.activation_id, "no instance found");
            self.status.set_status(ProcessStatus::Stopped, None).await?;
            return Ok(());
        };

        if process.status.is_terminal() {
            tracing::info!(activation_id = %self.activation_id, "already stopped");
            // A PENDING activation whose restart was just cancelled still
            // needs to land in STOPPED.
            if !activation.status.is_terminal() {
                self.status.set_status(ProcessStatus::Stopped, None).await?;
            }
            return Ok(());
        }

        if activation.status != ProcessStatus::Error {
            self.status.set_status(ProcessStatus::Stopping, None).await?;
        }
        self.status
            .set_latest_instance_status(ProcessStatus::Stopping, None)
            .await?;

        let log_handler = self.logger_for(&process.id);
        if let Some(pod_id) = &process.activation_pod_id {
            // Cleanup failures are user-visible on stop.
            if let Err(e) = self.engine.cleanup(pod_id, &log_handler).await {
                let msg =
                    format!("Activation {} failed to stop. Reason: {e}", self.activation_id);
                self.error_activation(&msg).await?;
                return Err(ManagerError::Stop(msg));
            }
        }

        self.status
            .set_latest_instance_status(ProcessStatus::Stopped, None)
            .await?;

        let user_msg = "Stop requested by user.";
        let activation = self.activation()?;
        if activation.status != ProcessStatus::Error {
            // do not overwrite the status and message if the activation
            // is already in error status
            self.status.set_status(ProcessStatus::Stopped, Some(user_msg)).await?;
        }
        let _ = log_handler.write_message(user_msg, true);
        tracing::info!(activation_id = %self.activation_id, "activation stopped");
        Ok(())
    }

    /// Stop, then schedule a start one second out.
    pub async fn restart(&self) -> Result<(), ManagerError> {
        tracing::info!(activation_id = %self.activation_id, "restart requested");

        let activation = self.activation()?;
        if activation.status == ProcessStatus::WorkersOffline {
            if !self.settings.allow_force_restart_when_offline {
                return Err(ManagerError::Start(format!(
                    "Activation {} has its workers offline; restart is not allowed.",
                    self.activation_id
                )));
            }
            // Force restart: drop the pin so a live queue adopts the
            // replacement process.
            self.store.clear_queue_pin(&self.activation_id);
        }

        self.stop().await?;

        let user_msg = "Restart requested by user.";
        self.status.set_status(ProcessStatus::Pending, Some(user_msg)).await?;
        self.write_latest_log(user_msg);
        self.schedule_restart(1).await?;
        Ok(())
    }

    /// Best-effort cleanup, then delete the activation row. The cascade
    /// removes processes, logs, queue pins, and every pending request —
    /// including any scheduled restart.
    pub async fn delete(&self) -> Result<(), ManagerError> {
        tracing::info!(activation_id = %self.activation_id, "delete requested");

        // Nothing on the engine side may block deletion.
        if let Err(e) = self.status.set_status(ProcessStatus::Deleting, None).await {
            tracing::warn!(activation_id = %self.activation_id, error = %e, "deleting status refused");
        }
        self.cleanup_instance().await;

        self.store.remove_activation(&self.activation_id).map_err(|e| {
            ManagerError::Delete(format!(
                "Delete operation failed: Activation {}: {e}",
                self.activation_id
            ))
        })?;
        tracing::info!(activation_id = %self.activation_id, "activation deleted");
        Ok(())
    }

    /// The reconciliation step: compare observed container state against
    /// the desired state and apply restart policies.
    pub async fn monitor(&self) -> Result<(), ManagerError> {
        tracing::info!(activation_id = %self.activation_id, "monitor requested");

        let activation = self.activation().map_err(|_| {
            ManagerError::Monitor(format!("Activation {} does not exist.", self.activation_id))
        })?;

        let Some(process) = self.store.latest_process(&self.activation_id)? else {
            let msg = format!("Activation {} has no instances.", self.activation_id);
            self.error_activation(&msg).await?;
            return Err(ManagerError::Monitor(msg));
        };
        let Some(pod_id) = process.activation_pod_id.clone() else {
            let msg = format!("Activation {} has no pod id.", self.activation_id);
            self.error_activation(&msg).await?;
            self.error_instance(&msg).await?;
            return Err(ManagerError::Monitor(msg));
        };

        // Disabled activations should be stopped.
        if !activation.is_enabled {
            tracing::info!(activation_id = %self.activation_id, "disabled; stopping");
            self.stop().await?;
            return Ok(());
        }

        if !activation.status.is_monitored() {
            tracing::info!(
                activation_id = %self.activation_id,
                status = %activation.status,
                "not running, nothing to do"
            );
            return Ok(());
        }

        self.detect_running_status().await?;

        let container_status = match self.engine.get_status(&pod_id).await {
            Ok(status) => Some(status),
            Err(EngineError::NotFound(_)) => None,
            Err(EngineError::ImagePull(reason)) => {
                // The backend cannot get the image; retryable through
                // restart policy.
                self.failed_policy(&reason).await?;
                return Ok(());
            }
            Err(e) => {
                let msg = format!(
                    "Activation {}: failed to get status of the container. Reason: {e}",
                    self.activation_id
                );
                self.error_instance(&msg).await?;
                self.error_activation(&msg).await?;
                return Err(ManagerError::Monitor(msg));
            }
        };

        // Activations in running status must have a container. This
        // covers containers deleted externally.
        let Some(container_status) = container_status else {
            self.missing_container_policy().await?;
            return Ok(());
        };

        tracing::info!(
            activation_id = %self.activation_id,
            container_status = %container_status.status,
            "observed container status"
        );

        self.update_logs().await;

        // Re-read: detect_running_status may have promoted.
        let process = self.store.get_process(&process.id)?;
        let activation = self.activation()?;

        // Exit states dispatch first: a finished container has stopped
        // heartbeating and must not be misread as unresponsive.
        match container_status.status {
            ProcessStatus::Completed => {
                self.cleanup_instance().await;
                self.completed_policy(&container_status.message).await?;
                return Ok(());
            }
            ProcessStatus::Failed => {
                self.failed_policy(&container_status.message).await?;
                return Ok(());
            }
            _ => {}
        }

        let check_readiness = process.status == ProcessStatus::Starting;
        if self.is_unresponsive(&activation, &process, check_readiness) {
            let check_type = if check_readiness { "Readiness" } else { "Liveness" };
            self.unresponsive_policy(check_type).await?;
            return Ok(());
        }

        match container_status.status {
            ProcessStatus::Running => {
                if activation.status == ProcessStatus::WorkersOffline {
                    tracing::info!(
                        activation_id = %self.activation_id,
                        "workers back; promoting to running"
                    );
                    let row = self.store.lock_row(&self.activation_id).await;
                    self.status.set_status_with(&row, ProcessStatus::Running, None)?;
                    self.status
                        .set_latest_instance_status_with(&row, ProcessStatus::Running, None)?;
                }
            }
            ProcessStatus::Error => {
                let msg = format!(
                    "Activation {}: container is in an error state. {}",
                    self.activation_id, container_status.message
                );
                self.error_instance(&msg).await?;
                self.error_activation(&msg).await?;
                return Err(ManagerError::Monitor(msg));
            }
            ProcessStatus::Stopped => {
                // We never asked for a stop; the engine must not report one.
                return Err(ManagerError::Monitor(format!(
                    "Container {pod_id} is in an stopped state."
                )));
            }
            // Still coming up; the readiness timeout owns slow starts.
            _ => {
                tracing::debug!(activation_id = %self.activation_id, "container still starting");
            }
        }
        Ok(())
    }

    /// Read the latest container output into the process log. Log errors
    /// never change the activation status.
    pub async fn update_logs(&self) {
        let process = match self.store.latest_process(&self.activation_id) {
            Ok(Some(p)) => p,
            _ => {
                tracing::error!(
                    activation_id = %self.activation_id,
                    "update logs failed: no instance found"
                );
                return;
            }
        };
        let Some(pod_id) = &process.activation_pod_id else {
            tracing::error!(
                activation_id = %self.activation_id,
                "update logs failed: no pod id found"
            );
            return;
        };
        let log_handler = self.logger_for(&process.id);
        if let Err(e) = self.engine.update_logs(pod_id, &log_handler).await {
            let msg = format!(
                "Logs for activation {} could not be fetched. Reason: {e}",
                self.activation_id
            );
            tracing::error!(activation_id = %self.activation_id, error = %e, "log update failed");
            let _ = log_handler.write_message(&msg, true);
        }
    }

    // ── start internals ──────────────────────────────────────────────

    async fn check_start_prerequirements(&self) -> Result<(), ManagerError> {
        let row = self.store.lock_row(&self.activation_id).await;
        let activation = self
            .activation()
            .map_err(|_| ManagerError::Start("The Activation does not exist.".to_string()))?;

        if !activation.is_enabled {
            let msg = format!(
                "Activation {} is disabled. Can not be started.",
                self.activation_id
            );
            tracing::warn!(activation_id = %self.activation_id, "{msg}");
            return Err(ManagerError::Start(msg));
        }
        if matches!(activation.status, ProcessStatus::Starting | ProcessStatus::Deleting) {
            let msg = format!(
                "Activation {} is in {} state, can not be started.",
                self.activation_id, activation.status
            );
            tracing::warn!(activation_id = %self.activation_id, "{msg}");
            return Err(ManagerError::Start(msg));
        }
        if let Err(reason) = validate_activation(&activation) {
            let msg = format!(
                "Activation {} can not be started. Reason: {reason}",
                self.activation_id
            );
            tracing::error!(activation_id = %self.activation_id, "{msg}");
            self.status.set_status_with(&row, ProcessStatus::Error, Some(&msg))?;
            return Err(ManagerError::Start(msg));
        }
        Ok(())
    }

    /// Idempotency probe: both the process row and the live container
    /// must agree the activation is running.
    async fn is_already_running(&self) -> Result<bool, ManagerError> {
        let Some(process) = self.store.latest_process(&self.activation_id)? else {
            return Ok(false);
        };
        let Some(pod_id) = &process.activation_pod_id else {
            tracing::info!(
                activation_id = %self.activation_id,
                "expected instance or pod id but not found, recreating"
            );
            return Ok(false);
        };
        if process.status != ProcessStatus::Running {
            return Ok(false);
        }
        match self.engine.get_status(pod_id).await {
            Ok(status) => Ok(status.status == ProcessStatus::Running),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => {
                tracing::warn!(
                    activation_id = %self.activation_id,
                    error = %e,
                    "engine status probe failed; treating as not running"
                );
                Ok(false)
            }
        }
    }

    /// Create a process and start its container. Returns whether a
    /// container actually started.
    async fn start_instance(&self) -> Result<bool, ManagerError> {
        self.status.set_status(ProcessStatus::Starting, None).await?;
        self.sweep_non_finalized_instances().await?;

        if !self.new_process_allowed() {
            let msg = format!(
                "No capacity to start a new rulebook process. Activation {} is postponed",
                self.activation_id
            );
            tracing::info!(activation_id = %self.activation_id, "{msg}");
            self.status.set_status(ProcessStatus::Pending, Some(&msg)).await?;
            return Ok(false);
        }

        let activation = self.activation()?;
        let mut process =
            RulebookProcess::new(self.activation_id.clone(), &activation.name, self.clock.epoch_ms());
        process.git_hash = activation.git_hash.clone();
        let process_id = process.id.clone();
        self.store.insert_process(process, &self.queue_name)?;
        tracing::info!(
            activation_id = %self.activation_id,
            process_id = %process_id,
            queue = %self.queue_name,
            "created rulebook process"
        );

        let log_handler = self.logger_for(&process_id);
        let request = match self.build_container_request(&activation, &process_id) {
            Ok(request) => request,
            Err(reason) => {
                let msg = format!(
                    "Activation {} not valid, container request cannot be built. Reason: {reason}",
                    self.activation_id
                );
                self.error_instance(&msg).await?;
                self.error_activation(&msg).await?;
                return Err(ManagerError::Start(msg));
            }
        };

        match self.engine.start(&request, &log_handler).await {
            Ok(pod_id) => {
                let now = self.clock.epoch_ms();
                self.store.update_process(&process_id, |p| {
                    p.activation_pod_id = Some(pod_id.clone());
                    p.started_at_ms = now;
                })?;
                tracing::info!(
                    activation_id = %self.activation_id,
                    process_id = %process_id,
                    %pod_id,
                    "container start successful"
                );
                self.update_logs().await;
                Ok(true)
            }
            Err(e @ (EngineError::ImagePull(_) | EngineError::Login(_))) => {
                // Retryable through restart policy, not fatal.
                let msg =
                    format!("Activation {} failed to start. Reason: {e}", self.activation_id);
                self.failed_policy(&msg).await?;
                Ok(false)
            }
            Err(e) => {
                let msg =
                    format!("Activation {} failed to start. Reason: {e}", self.activation_id);
                self.error_instance(&msg).await?;
                self.error_activation(&msg).await?;
                Err(ManagerError::Start(msg))
            }
        }
    }

    /// Repair pass: any previous process left in a non-terminal status
    /// is cleaned up and marked stopped before a new one is created.
    async fn sweep_non_finalized_instances(&self) -> Result<(), ManagerError> {
        let now = self.clock.epoch_ms();
        for process in self.store.processes_for_activation(&self.activation_id) {
            if process.status.is_terminal() {
                continue;
            }
            tracing::warn!(
                activation_id = %self.activation_id,
                process_id = %process.id,
                status = %process.status,
                "unexpected instance status, cleaning up"
            );
            if let Some(pod_id) = &process.activation_pod_id {
                let log_handler = self.logger_for(&process.id);
                if let Err(e) = self.engine.cleanup(pod_id, &log_handler).await {
                    tracing::error!(process_id = %process.id, error = %e, "sweep cleanup failed");
                }
            }
            if process.status.may_transition(ProcessStatus::Stopped) {
                self.store.update_process(&process.id, |p| {
                    p.status = ProcessStatus::Stopped;
                    p.ended_at_ms = Some(now);
                    p.activation_pod_id = None;
                })?;
            }
        }
        Ok(())
    }

    /// Admission control against the node-local cap.
    fn new_process_allowed(&self) -> bool {
        if self.settings.max_running_activations < 0 {
            return true;
        }
        let active = self.store.count_active_on_queue(&self.queue_name);
        active < self.settings.max_running_activations as usize
    }

    fn build_container_request(
        &self,
        activation: &Activation,
        process_id: &ProcessId,
    ) -> Result<ContainerRequest, String> {
        let de = activation
            .decision_environment
            .as_ref()
            .ok_or_else(|| "decision environment is missing".to_string())?;
        let ports = find_ports(&activation.rulebook_rulesets).map_err(|e| e.to_string())?;

        let cmdline = WorkerCmdline {
            ws_url: self.settings.ws_url(),
            ws_ssl_verify: self.settings.ws_ssl_verify,
            process_id: process_id.clone(),
            heartbeat_secs: self.settings.liveness_check_secs,
            log_level: activation
                .log_level
                .clone()
                .or_else(|| self.settings.rulebook_log_level.clone()),
            skip_audit_events: activation.skip_audit_events,
        };

        let extra = match self.settings.deployment_type {
            DeploymentType::Podman => EngineExtra::Podman { extra_args: Vec::new() },
            DeploymentType::K8s => EngineExtra::Kubernetes {
                service_name: activation.k8s_service_name.clone(),
            },
        };

        Ok(ContainerRequest {
            name: format!("rr-{}-{}", process_id.short(8), uuid::Uuid::new_v4()),
            image_url: de.image_url.clone(),
            pull_policy: PullPolicy::Always,
            cmdline,
            credential: de.credential.clone(),
            ports,
            mem_limit: None,
            mounts: Vec::new(),
            env_vars: Vec::new(),
            extra,
            parent_id: self.activation_id.clone(),
            process_id: process_id.clone(),
        })
    }

    // ── monitor internals ────────────────────────────────────────────

    /// The STARTING→RUNNING promotion: after at least one heartbeat,
    /// atomically set both rows to RUNNING and reset the failure count.
    async fn detect_running_status(&self) -> Result<(), ManagerError> {
        let Some(process) = self.store.latest_process(&self.activation_id)? else {
            return Ok(());
        };
        if process.status == ProcessStatus::Starting && process.has_heartbeat() {
            let row = self.store.lock_row(&self.activation_id).await;
            self.status.set_status_with(&row, ProcessStatus::Running, None)?;
            self.status
                .set_latest_instance_status_with(&row, ProcessStatus::Running, None)?;
            self.store.update_activation(&self.activation_id, |a| a.failure_count = 0)?;
            tracing::info!(
                activation_id = %self.activation_id,
                process_id = %process.id,
                "first heartbeat observed; activation is running"
            );
        }
        Ok(())
    }

    fn is_unresponsive(
        &self,
        activation: &Activation,
        process: &RulebookProcess,
        check_readiness: bool,
    ) -> bool {
        let now = self.clock.epoch_ms();
        if check_readiness {
            now.saturating_sub(process.started_at_ms)
                > self.settings.readiness_timeout_secs * 1000
        } else if matches!(activation.status, ProcessStatus::Running | ProcessStatus::Starting) {
            process
                .updated_at_ms
                .is_some_and(|beat| now.saturating_sub(beat) > self.settings.liveness_timeout_secs * 1000)
        } else {
            false
        }
    }

    // ── shared helpers ───────────────────────────────────────────────

    pub(crate) fn activation(&self) -> Result<Activation, StoreError> {
        self.store.get_activation(&self.activation_id)
    }

    pub(crate) fn logger_for(&self, process_id: &ProcessId) -> DbLogger<C> {
        DbLogger::new(
            self.store.clone(),
            process_id.clone(),
            self.settings.flush_after,
            self.clock.clone(),
        )
    }

    /// Cleanup the latest instance's container, absorbing failures: no
    /// identified case wants to stop the workflow over a cleanup error.
    pub(crate) async fn cleanup_instance(&self) {
        let process = match self.store.latest_process(&self.activation_id) {
            Ok(Some(p)) => p,
            _ => return,
        };
        let Some(pod_id) = &process.activation_pod_id else {
            tracing::info!(
                activation_id = %self.activation_id,
                "cleanup: no instance or pod id found"
            );
            return;
        };
        let log_handler = self.logger_for(&process.id);
        if let Err(e) = self.engine.cleanup(pod_id, &log_handler).await {
            let msg = format!(
                "Activation {} failed to cleanup its latest instance {} with pod id {pod_id}. \
                 Reason: {e}",
                self.activation_id, process.id
            );
            tracing::error!(activation_id = %self.activation_id, "{msg}");
            let _ = log_handler.write_message(&msg, true);
        }
    }

    /// Fail the latest instance: cleanup, terminal FAILED, count the
    /// failure.
    pub(crate) async fn fail_instance(&self, msg: &str) -> Result<(), ManagerError> {
        self.cleanup_instance().await;
        self.status
            .set_latest_instance_status(ProcessStatus::Failed, Some(msg))
            .await?;
        let _row = self.store.lock_row(&self.activation_id).await;
        self.store
            .update_activation(&self.activation_id, |a| a.failure_count += 1)?;
        Ok(())
    }

    pub(crate) async fn error_instance(&self, msg: &str) -> Result<(), ManagerError> {
        self.cleanup_instance().await;
        self.status
            .set_latest_instance_status(ProcessStatus::Error, Some(msg))
            .await?;
        Ok(())
    }

    pub(crate) async fn error_activation(&self, msg: &str) -> Result<(), ManagerError> {
        tracing::error!(activation_id = %self.activation_id, "{msg}");
        self.status.set_status(ProcessStatus::Error, Some(msg)).await?;
        Ok(())
    }

    /// Append a user-facing message to the latest process log.
    pub(crate) fn write_latest_log(&self, msg: &str) {
        if let Ok(Some(process)) = self.store.latest_process(&self.activation_id) {
            let _ = self.logger_for(&process.id).write_message(msg, true);
        }
    }

    /// Delayed AUTO_START through the request queue; survives worker
    /// restarts.
    pub(crate) async fn schedule_restart(&self, delay_secs: u64) -> Result<(), ManagerError> {
        let due = self.clock.epoch_ms() + delay_secs * 1000;
        self.store
            .push_request(&self.activation_id, ActivationRequest::AutoStart, None, due)?;
        match self.store.queue_for_activation(&self.activation_id) {
            Some(queue) => self.store.wake(&queue),
            None => self.store.wake_all(),
        }
        tracing::info!(
            activation_id = %self.activation_id,
            delay_secs,
            "restart scheduled"
        );
        Ok(())
    }
}

/// Static validation: everything a container request will need must
/// resolve before a process row is created.
fn validate_activation(activation: &Activation) -> Result<(), String> {
    if activation.decision_environment.is_none() {
        return Err("decision environment is missing".to_string());
    }
    if let Err(e) = find_ports(&activation.rulebook_rulesets) {
        return Err(format!("rulebook is not valid: {e}"));
    }
    if requires_controller_token(&activation.rulebook_rulesets)
        && activation.controller_credential().is_none()
    {
        return Err(
            "rulebook requires a controller token but no controller credential is configured"
                .to_string(),
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
