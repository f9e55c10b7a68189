// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle statuses shared by activations and rulebook processes.
//!
//! The status machine is an explicit table: every write goes through
//! [`ProcessStatus::may_transition`], and the status manager refuses
//! anything the table does not allow. The table exists to stop the races
//! a free-for-all invites — the canonical one being a monitor pass
//! resurrecting an activation that a concurrent stop already moved to
//! STOPPING.

use serde::{Deserialize, Serialize};

/// Status of an activation or one of its rulebook processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Waiting for capacity or for a scheduled start
    Pending,
    /// Container requested, no heartbeat yet
    Starting,
    /// At least one heartbeat received
    Running,
    /// Stop requested, cleanup in flight
    Stopping,
    /// Stopped on request (terminal)
    Stopped,
    /// Container exited with code 0 (terminal)
    Completed,
    /// Container exited nonzero or went missing (terminal)
    Failed,
    /// Unrecoverable configuration or engine problem (terminal)
    Error,
    /// Deletion in flight; nothing leaves this state
    Deleting,
    /// Readiness or liveness window elapsed without a heartbeat
    Unresponsive,
    /// No worker on the pinned queue is reporting liveness
    WorkersOffline,
}

crate::simple_display! {
    ProcessStatus {
        Pending => "pending",
        Starting => "starting",
        Running => "running",
        Stopping => "stopping",
        Stopped => "stopped",
        Completed => "completed",
        Failed => "failed",
        Error => "error",
        Deleting => "deleting",
        Unresponsive => "unresponsive",
        WorkersOffline => "workers_offline",
    }
}

impl ProcessStatus {
    /// Terminal statuses: no engine calls are made from here except the
    /// idempotent `cleanup`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed | Self::Error)
    }

    /// Statuses the periodic monitor cares about.
    pub fn is_monitored(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::WorkersOffline)
    }

    /// Whether a transition from `self` to `to` is allowed.
    ///
    /// Re-entering the same status is always allowed (message refreshes).
    pub fn may_transition(self, to: ProcessStatus) -> bool {
        use ProcessStatus::*;
        if self == to {
            return true;
        }
        match self {
            Pending => matches!(to, Starting | Stopping | Stopped | Deleting | Error | WorkersOffline),
            // Completed is reachable straight from Starting: a short
            // rulebook can exit 0 before its first heartbeat.
            Starting => matches!(
                to,
                Running
                    | Pending
                    | Stopping
                    | Stopped
                    | Completed
                    | Failed
                    | Error
                    | Deleting
                    | Unresponsive
                    | WorkersOffline
            ),
            Running => matches!(
                to,
                Completed
                    | Failed
                    | Error
                    | Stopping
                    | Stopped
                    | Deleting
                    | Unresponsive
                    | WorkersOffline
            ),
            // A stop in flight may only finalize. In particular a racing
            // monitor may not push it back to Running.
            Stopping => matches!(to, Stopped | Failed | Error | Deleting),
            Stopped => matches!(to, Starting | Pending | Deleting | Error),
            Completed => matches!(to, Starting | Pending | Deleting | Error),
            Failed => matches!(to, Starting | Pending | Deleting | Error),
            Error => matches!(to, Starting | Pending | Stopped | Deleting),
            Unresponsive => {
                matches!(to, Starting | Pending | Stopped | Failed | Error | Deleting | WorkersOffline)
            }
            WorkersOffline => matches!(
                to,
                Running
                    | Starting
                    | Pending
                    | Stopping
                    | Stopped
                    | Failed
                    | Error
                    | Deleting
                    | Unresponsive
            ),
            Deleting => false,
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
