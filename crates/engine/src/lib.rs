// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rr-engine: the container engine capability.
//!
//! # Module layout
//!
//! - [`request`] — [`ContainerRequest`] and the worker command line
//! - [`error`] — the engine error kinds
//! - [`logparse`] — the shared incremental log-read algorithm
//! - [`podman`] — local-daemon backend over the Podman CLI and socket
//! - [`kubernetes`] — Job + Pod + Service + Secret backend via `kube`
//!
//! # Architecture
//!
//! The capability is four operations over an opaque engine-assigned
//! handle: `start`, `get_status`, `update_logs`, `cleanup`. Backends
//! translate their native container states onto the orchestrator's
//! statuses and their native failures onto [`EngineError`] kinds; the
//! activation manager never sees backend-specific types.

pub mod error;
pub mod logparse;
pub mod messages;
pub mod request;

pub mod kubernetes;
pub mod podman;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeEngine, FakeFailure};

pub use error::EngineError;
pub use kubernetes::KubernetesEngine;
pub use podman::PodmanEngine;
pub use request::{BindMount, ContainerRequest, EngineExtra, PullPolicy, WorkerCmdline};

use async_trait::async_trait;
use rr_core::ProcessStatus;

/// Backend-reported container state, already mapped onto the
/// orchestrator's statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub status: ProcessStatus,
    pub message: String,
}

impl ContainerStatus {
    pub fn new(status: ProcessStatus, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

/// Sink for container output, implemented by the daemon on top of the
/// store. Writes are buffered; `flush` persists.
pub trait LogHandler: Send + Sync {
    /// Buffer a container log line with its engine-reported timestamp
    /// (milliseconds, the dedup key).
    fn write(&self, line: &str, flush: bool, log_timestamp_ms: u64) -> Result<(), EngineError>;

    /// Buffer an operational message, stamped with the current time.
    fn write_message(&self, message: &str, flush: bool) -> Result<(), EngineError>;

    fn flush(&self) -> Result<(), EngineError>;

    /// The monotonic log cursor for this process, epoch milliseconds.
    fn get_log_read_at(&self) -> Option<u64>;

    fn set_log_read_at(&self, ms: u64) -> Result<(), EngineError>;

    /// Delete persisted rows whose timestamp equals `log_timestamp_ms`
    /// exactly, so a replayed boundary batch cannot duplicate rows.
    fn clear_log_write_from(&self, log_timestamp_ms: u64) -> Result<(), EngineError>;
}

/// Abstract interface to the deployment backend.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Start a container for the request; returns the engine-assigned
    /// handle.
    async fn start(
        &self,
        request: &ContainerRequest,
        log_handler: &dyn LogHandler,
    ) -> Result<String, EngineError>;

    /// Map the backend's native state onto a [`ContainerStatus`].
    async fn get_status(&self, container_id: &str) -> Result<ContainerStatus, EngineError>;

    /// Incrementally read container output into the log handler.
    async fn update_logs(
        &self,
        container_id: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError>;

    /// Stop and remove the container and its satellite resources.
    /// Idempotent: a missing container is not an error.
    async fn cleanup(
        &self,
        container_id: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError>;
}
