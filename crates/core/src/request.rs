// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request queue row types.
//!
//! Lifecycle requests are rows in a per-activation FIFO, consumed by the
//! worker pinned to the activation's queue. Restart scheduling is a
//! delayed enqueue (`not_before_ms`) into the same queue, never an
//! in-process timer, so a pending restart survives a worker restart.

use crate::id::ActivationId;
use serde::{Deserialize, Serialize};

/// A lifecycle request against an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationRequest {
    Start,
    Stop,
    Restart,
    Delete,
    /// Produced by restart policy; ordered like Start but refused if the
    /// activation was disabled after it was scheduled
    AutoStart,
    /// Reconciliation pass enqueued by the scheduler or the heartbeat
    /// endpoint
    Monitor,
}

crate::simple_display! {
    ActivationRequest {
        Start => "start",
        Stop => "stop",
        Restart => "restart",
        Delete => "delete",
        AutoStart => "auto_start",
        Monitor => "monitor",
    }
}

impl ActivationRequest {
    /// AUTO_START orders like START everywhere the coalescing rules care.
    pub fn is_start(self) -> bool {
        matches!(self, Self::Start | Self::AutoStart)
    }

    /// User-visible kinds are subject to the coalescing rules; monitor
    /// traffic is not.
    pub fn is_user_visible(self) -> bool {
        !matches!(self, Self::Monitor)
    }
}

/// A queued request row. `id` is assigned by the store in insertion order
/// and is the FIFO key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: u64,
    pub activation_id: ActivationId,
    pub request: ActivationRequest,
    /// Trace id propagated from the API caller
    pub request_id: Option<String>,
    /// Row is invisible to workers before this time (delayed restarts)
    pub not_before_ms: u64,
}

/// Coalesce one activation's pending queue before dispatch.
///
/// Rules, applied to the user-visible rows in FIFO order:
/// - an oldest DELETE drops every later row,
/// - consecutive starts (START or AUTO_START) collapse to the first,
/// - a STOP followed by a later START stays as-is — that pair is an
///   explicit restart.
///
/// Monitor rows pass through untouched. Returns the ids of rows to drop.
pub fn coalesce(rows: &[QueuedRequest]) -> Vec<u64> {
    let user_rows: Vec<&QueuedRequest> =
        rows.iter().filter(|r| r.request.is_user_visible()).collect();

    let mut dropped = Vec::new();
    if let Some(first) = user_rows.first() {
        if first.request == ActivationRequest::Delete {
            dropped.extend(user_rows.iter().skip(1).map(|r| r.id));
            return dropped;
        }
    }

    let mut prev_was_start = false;
    for row in user_rows {
        if row.request.is_start() {
            if prev_was_start {
                dropped.push(row.id);
            }
            prev_was_start = true;
        } else {
            prev_was_start = false;
        }
    }
    dropped
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
