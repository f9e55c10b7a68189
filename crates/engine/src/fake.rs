// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted engine and log handler for tests.

use crate::error::EngineError;
use crate::request::ContainerRequest;
use crate::{ContainerEngine, ContainerStatus, LogHandler};
use async_trait::async_trait;
use parking_lot::Mutex;
use rr_core::ProcessStatus;
use std::collections::HashMap;
use std::sync::Arc;

/// Failure kinds a test can script. `EngineError` itself is not `Clone`,
/// so scripts store the kind and the message and build the error on use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    ImagePull,
    Login,
    Start,
    Engine,
}

impl FakeFailure {
    fn to_error(self, message: &str) -> EngineError {
        match self {
            Self::ImagePull => EngineError::ImagePull(message.to_string()),
            Self::Login => EngineError::Login(message.to_string()),
            Self::Start => EngineError::Start(message.to_string()),
            Self::Engine => EngineError::Engine(message.to_string()),
        }
    }
}

#[derive(Default)]
struct FakeState {
    /// Handles issued so far
    started: Vec<(String, ContainerRequest)>,
    /// Scripted status per handle; default Running
    statuses: HashMap<String, ContainerStatus>,
    /// Handles that report NotFound from get_status
    missing: Vec<String>,
    /// Failure for the next start call
    next_start_failure: Option<(FakeFailure, String)>,
    /// Raw timestamped log batches per handle, drained by update_logs
    pending_logs: HashMap<String, Vec<String>>,
    cleanup_counts: HashMap<String, usize>,
    counter: u64,
}

/// A scripted [`ContainerEngine`]: statuses and failures are set by the
/// test, calls are recorded for assertions.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `start` with the given kind.
    pub fn fail_next_start(&self, failure: FakeFailure, message: &str) {
        self.state.lock().next_start_failure = Some((failure, message.to_string()));
    }

    /// Script the status reported for a handle.
    pub fn set_status(&self, handle: &str, status: ProcessStatus, message: &str) {
        self.state
            .lock()
            .statuses
            .insert(handle.to_string(), ContainerStatus::new(status, message));
    }

    /// Make a handle report NotFound (externally deleted container).
    pub fn set_missing(&self, handle: &str) {
        self.state.lock().missing.push(handle.to_string());
    }

    /// Queue raw timestamped lines (`<rfc3339> <content>`) for the next
    /// `update_logs` on the handle.
    pub fn push_raw_logs(&self, handle: &str, lines: &[&str]) {
        self.state
            .lock()
            .pending_logs
            .entry(handle.to_string())
            .or_default()
            .extend(lines.iter().map(|l| l.to_string()));
    }

    /// Handles issued so far, in order.
    pub fn handles(&self) -> Vec<String> {
        self.state.lock().started.iter().map(|(h, _)| h.clone()).collect()
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().started.len()
    }

    /// The request passed to the most recent `start`.
    pub fn last_request(&self) -> Option<ContainerRequest> {
        self.state.lock().started.last().map(|(_, r)| r.clone())
    }

    pub fn cleanup_count(&self, handle: &str) -> usize {
        self.state.lock().cleanup_counts.get(handle).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn start(
        &self,
        request: &ContainerRequest,
        log_handler: &dyn LogHandler,
    ) -> Result<String, EngineError> {
        let handle = {
            let mut state = self.state.lock();
            if let Some((failure, message)) = state.next_start_failure.take() {
                return Err(failure.to_error(&message));
            }
            state.counter += 1;
            let handle = format!("fake-{}", state.counter);
            state.started.push((handle.clone(), request.clone()));
            state
                .statuses
                .entry(handle.clone())
                .or_insert_with(|| ContainerStatus::new(ProcessStatus::Running, "running"));
            handle
        };
        log_handler.write_message(&format!("Container {handle} is started."), true)?;
        Ok(handle)
    }

    async fn get_status(&self, container_id: &str) -> Result<ContainerStatus, EngineError> {
        let state = self.state.lock();
        if state.missing.iter().any(|h| h == container_id) {
            return Err(EngineError::NotFound(container_id.to_string()));
        }
        state
            .statuses
            .get(container_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(container_id.to_string()))
    }

    async fn update_logs(
        &self,
        container_id: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        let raw = {
            let mut state = self.state.lock();
            let lines = state.pending_logs.remove(container_id).unwrap_or_default();
            lines.join("\n")
        };
        if !raw.is_empty() {
            crate::logparse::apply_raw_logs(&raw, log_handler)?;
        }
        Ok(())
    }

    async fn cleanup(
        &self,
        container_id: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        *self
            .state
            .lock()
            .cleanup_counts
            .entry(container_id.to_string())
            .or_insert(0) += 1;
        log_handler.write_message(&format!("Container {container_id} is cleaned up."), true)?;
        Ok(())
    }
}

/// An in-memory [`LogHandler`] recording everything it is given.
#[derive(Clone, Default)]
pub struct RecordingLogHandler {
    inner: Arc<Mutex<RecordingState>>,
}

#[derive(Default)]
struct RecordingState {
    buffered: Vec<(String, u64)>,
    persisted: Vec<(String, u64)>,
    messages: Vec<String>,
    log_read_at: Option<u64>,
}

impl RecordingLogHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted `(line, timestamp_ms)` rows, flush order.
    pub fn persisted(&self) -> Vec<(String, u64)> {
        self.inner.lock().persisted.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.inner.lock().messages.clone()
    }

    pub fn log_read_at(&self) -> Option<u64> {
        self.inner.lock().log_read_at
    }

    pub fn set_cursor(&self, ms: u64) {
        self.inner.lock().log_read_at = Some(ms);
    }
}

impl LogHandler for RecordingLogHandler {
    fn write(&self, line: &str, flush: bool, log_timestamp_ms: u64) -> Result<(), EngineError> {
        let mut state = self.inner.lock();
        state.buffered.push((line.to_string(), log_timestamp_ms));
        if flush {
            let drained: Vec<_> = state.buffered.drain(..).collect();
            state.persisted.extend(drained);
        }
        Ok(())
    }

    fn write_message(&self, message: &str, _flush: bool) -> Result<(), EngineError> {
        self.inner.lock().messages.push(message.to_string());
        Ok(())
    }

    fn flush(&self) -> Result<(), EngineError> {
        let mut state = self.inner.lock();
        let drained: Vec<_> = state.buffered.drain(..).collect();
        state.persisted.extend(drained);
        Ok(())
    }

    fn get_log_read_at(&self) -> Option<u64> {
        self.inner.lock().log_read_at
    }

    fn set_log_read_at(&self, ms: u64) -> Result<(), EngineError> {
        self.inner.lock().log_read_at = Some(ms);
        Ok(())
    }

    fn clear_log_write_from(&self, log_timestamp_ms: u64) -> Result<(), EngineError> {
        self.inner.lock().persisted.retain(|(_, ts)| *ts != log_timestamp_ms);
        Ok(())
    }
}
