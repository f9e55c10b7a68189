// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store-backed container log handler.
//!
//! Buffers lines in memory and flushes them to the process log table,
//! either every N lines (`ANSIBLE_RULEBOOK_FLUSH_AFTER`) or only when
//! asked. Operational messages get a human-readable timestamp prefix and
//! a zero dedup key; container lines carry their engine timestamp.

use crate::env::FlushAfter;
use parking_lot::Mutex;
use rr_core::{Clock, ProcessId};
use rr_engine::{EngineError, LogHandler};
use rr_storage::{ProcessLogLine, Store};

pub struct DbLogger<C: Clock> {
    store: Store,
    process_id: ProcessId,
    clock: C,
    flush_after: FlushAfter,
    state: Mutex<BufferState>,
}

#[derive(Default)]
struct BufferState {
    buffer: Vec<ProcessLogLine>,
    line_count: usize,
}

impl<C: Clock> DbLogger<C> {
    pub fn new(store: Store, process_id: ProcessId, flush_after: FlushAfter, clock: C) -> Self {
        Self { store, process_id, clock, flush_after, state: Mutex::new(BufferState::default()) }
    }

    fn push(&self, line: String, log_timestamp_ms: u64, flush: bool) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            if let FlushAfter::Lines(n) = self.flush_after {
                if n > 0 && state.line_count % n == 0 && !state.buffer.is_empty() {
                    let drained = std::mem::take(&mut state.buffer);
                    drop(state);
                    self.persist(drained)?;
                    state = self.state.lock();
                }
            }
            state.buffer.push(ProcessLogLine {
                process_id: self.process_id.clone(),
                line,
                log_timestamp_ms,
            });
            state.line_count += 1;
        }
        if flush {
            self.flush()?;
        }
        Ok(())
    }

    fn persist(&self, lines: Vec<ProcessLogLine>) -> Result<(), EngineError> {
        if lines.is_empty() {
            return Ok(());
        }
        self.store
            .append_log_lines(&self.process_id, lines)
            .map_err(|e| EngineError::UpdateLogs(e.to_string()))
    }

    fn stamp(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.clock.epoch_ms() as i64)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S,%3f").to_string())
            .unwrap_or_default()
    }
}

impl<C: Clock> LogHandler for DbLogger<C> {
    fn write(&self, line: &str, flush: bool, log_timestamp_ms: u64) -> Result<(), EngineError> {
        self.push(line.to_string(), log_timestamp_ms, flush)
    }

    fn write_message(&self, message: &str, flush: bool) -> Result<(), EngineError> {
        self.push(format!("{} {}", self.stamp(), message), 0, flush)
    }

    fn flush(&self) -> Result<(), EngineError> {
        let drained = std::mem::take(&mut self.state.lock().buffer);
        self.persist(drained)
    }

    fn get_log_read_at(&self) -> Option<u64> {
        self.store.get_process(&self.process_id).ok().and_then(|p| p.log_read_at_ms)
    }

    fn set_log_read_at(&self, ms: u64) -> Result<(), EngineError> {
        self.store
            .update_process(&self.process_id, |p| p.log_read_at_ms = Some(ms))
            .map(|_| ())
            .map_err(|e| EngineError::UpdateLogs(e.to_string()))
    }

    fn clear_log_write_from(&self, log_timestamp_ms: u64) -> Result<(), EngineError> {
        self.store.delete_log_lines_at(&self.process_id, log_timestamp_ms);
        Ok(())
    }
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
