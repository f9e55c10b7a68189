// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart policies.
//!
//! - NEVER — terminal FAILED/COMPLETED, no reschedule
//! - ON_FAILURE — restart on failure while under the cap
//! - ALWAYS — same cap on failure; always restart on clean exit
//!
//! Scheduling is cooperative: a delayed AUTO_START row in the request
//! queue. Policy messages carry the count, the reason, and the delay so
//! the user sees them in both the status message and the process log.

use super::{ActivationManager, ManagerError};
use rr_core::{Clock, ProcessStatus, RestartPolicy};

/// Prefix a policy message with what the container reported, when it
/// reported anything.
fn compose(container_msg: &str, user_msg: &str) -> String {
    if container_msg.is_empty() {
        user_msg.to_string()
    } else {
        format!("{container_msg} {user_msg}")
    }
}

impl<C: Clock> ActivationManager<C> {
    /// Applied when the container exited cleanly. Completed containers
    /// are only restarted by the ALWAYS policy.
    pub(crate) async fn completed_policy(&self, container_msg: &str) -> Result<(), ManagerError> {
        let activation = self.activation()?;
        tracing::info!(activation_id = %self.activation_id, "completed policy called");

        if activation.restart_policy == RestartPolicy::Always {
            let user_msg = compose(
                container_msg,
                &format!(
                    "Activation completed. It will attempt to restart in {} seconds \
                     according to the restart policy {}. It may take longer if there is \
                     no capacity available.",
                    self.settings.restart_secs_on_complete,
                    RestartPolicy::Always,
                ),
            );
            self.write_latest_log(&user_msg);
            self.status
                .set_latest_instance_status(ProcessStatus::Completed, Some(&user_msg))
                .await?;
            self.status
                .set_status(ProcessStatus::Completed, Some(&user_msg))
                .await?;
            self.schedule_restart(self.settings.restart_secs_on_complete).await?;
        } else {
            let user_msg = compose(
                container_msg,
                "Activation completed successfully. No restart policy is applied.",
            );
            self.status
                .set_latest_instance_status(ProcessStatus::Completed, Some(&user_msg))
                .await?;
            self.status
                .set_status(ProcessStatus::Completed, Some(&user_msg))
                .await?;
        }
        Ok(())
    }

    /// Applied when the container failed, or when an image pull or
    /// registry login failed. Counts the failure and restarts while
    /// policy and cap allow.
    pub(crate) async fn failed_policy(&self, container_msg: &str) -> Result<(), ManagerError> {
        let activation = self.activation()?;
        tracing::info!(activation_id = %self.activation_id, "failed policy called");
        let max_restarts = self.settings.max_restarts_on_failure;

        if activation.restart_policy == RestartPolicy::Never {
            let user_msg =
                compose(container_msg, "Activation failed. Restart policy is not applicable.");
            self.write_latest_log(&user_msg);
            self.fail_instance(&user_msg).await?;
            self.status
                .set_status(ProcessStatus::Failed, Some(&user_msg))
                .await?;
        } else if activation.failure_count >= max_restarts {
            let user_msg = compose(
                container_msg,
                "Activation failed. Has reached the maximum number of restarts. \
                 Restart policy is not applicable.",
            );
            tracing::info!(
                activation_id = %self.activation_id,
                failure_count = activation.failure_count,
                "restart cap reached"
            );
            self.write_latest_log(&user_msg);
            self.fail_instance(&user_msg).await?;
            self.status
                .set_status(ProcessStatus::Failed, Some(&user_msg))
                .await?;
        } else {
            let count_msg = format!("({}/{})", activation.failure_count + 1, max_restarts);
            let user_msg = compose(
                container_msg,
                &format!(
                    "Activation failed. It will attempt to restart {count_msg} in {} seconds \
                     according to the restart policy {}. It may take longer if there is no \
                     capacity available.",
                    self.settings.restart_secs_on_failure,
                    activation.restart_policy,
                ),
            );
            self.write_latest_log(&user_msg);
            self.fail_instance(&user_msg).await?;
            self.status
                .set_status(ProcessStatus::Failed, Some(&user_msg))
                .await?;
            self.schedule_restart(self.settings.restart_secs_on_failure).await?;
        }
        Ok(())
    }

    /// Applied when a readiness or liveness window elapsed without a
    /// heartbeat.
    pub(crate) async fn unresponsive_policy(&self, check_type: &str) -> Result<(), ManagerError> {
        let activation = self.activation()?;
        tracing::info!(
            activation_id = %self.activation_id,
            check_type,
            "unresponsive policy called"
        );

        if activation.restart_policy == RestartPolicy::Never {
            let user_msg = format!(
                "Activation is unresponsive. {check_type} check for ansible rulebook timed \
                 out. Restart policy is not applicable."
            );
            self.write_latest_log(&user_msg);
            self.fail_instance(&user_msg).await?;
            self.status
                .set_status(ProcessStatus::Failed, Some(&user_msg))
                .await?;
        } else {
            let user_msg = format!(
                "Activation is unresponsive. {check_type} check for ansible rulebook timed \
                 out. Activation is going to be restarted."
            );
            self.write_latest_log(&user_msg);
            self.fail_instance(&user_msg).await?;
            self.status
                .set_status(ProcessStatus::Failed, Some(&user_msg))
                .await?;
            self.schedule_restart(1).await?;
        }
        Ok(())
    }

    /// Applied when the engine no longer knows the handle: the container
    /// was deleted externally.
    pub(crate) async fn missing_container_policy(&self) -> Result<(), ManagerError> {
        let activation = self.activation()?;
        tracing::info!(activation_id = %self.activation_id, "missing container policy called");

        let mut msg = "Missing container for running activation.".to_string();
        self.fail_instance(&msg).await?;

        if activation.restart_policy == RestartPolicy::Never {
            msg.push_str(" Restart policy not applicable.");
        } else {
            msg.push_str(" Restart policy is applied.");
            self.schedule_restart(1).await?;
        }

        self.status.set_status(ProcessStatus::Failed, Some(&msg)).await?;
        self.write_latest_log(&msg);
        Ok(())
    }
}
