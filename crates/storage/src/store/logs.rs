// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only process logs.

use super::{ProcessLogLine, Store};
use crate::error::StoreError;
use rr_core::ProcessId;

impl Store {
    /// Append lines for a process. Fails when the process row is gone
    /// (the activation was deleted mid-flush).
    pub fn append_log_lines(
        &self,
        process_id: &ProcessId,
        lines: Vec<ProcessLogLine>,
    ) -> Result<(), StoreError> {
        self.write(|t| {
            if !t.processes.contains_key(process_id) {
                return Err(StoreError::not_found("process", process_id.as_str()));
            }
            t.logs.entry(process_id.clone()).or_default().extend(lines);
            Ok(())
        })
    }

    /// Delete rows whose millisecond timestamp equals `log_timestamp_ms`
    /// exactly. Called before re-inserting the boundary batch so a crash
    /// between cursor-advance and insert cannot duplicate lines.
    pub fn delete_log_lines_at(&self, process_id: &ProcessId, log_timestamp_ms: u64) -> usize {
        self.write(|t| {
            let Some(lines) = t.logs.get_mut(process_id) else { return 0 };
            let before = lines.len();
            lines.retain(|l| l.log_timestamp_ms != log_timestamp_ms);
            before - lines.len()
        })
    }

    pub fn logs_for_process(&self, process_id: &ProcessId) -> Vec<ProcessLogLine> {
        self.read(|t| t.logs.get(process_id).cloned().unwrap_or_default())
    }

    pub fn log_line_count(&self, process_id: &ProcessId) -> usize {
        self.read(|t| t.logs.get(process_id).map_or(0, Vec::len))
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
