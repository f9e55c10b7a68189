// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from container engine operations.
///
/// The activation manager keys its recovery on these kinds: image-pull
/// and login failures feed the restart policy, a missing container
/// triggers the missing-container policy, cleanup and log errors are
/// absorbed locally, and everything else escalates.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine cannot be initialized (unreachable socket, missing
    /// namespace)
    #[error("container engine initialization failed: {0}")]
    Init(String),
    /// Engine accepted the request but failed to run the container
    #[error("container start failed: {0}")]
    Start(String),
    /// Image unavailable; retryable through restart policy
    #[error("image pull failed: {0}")]
    ImagePull(String),
    /// Registry auth failed; retryable through restart policy
    #[error("registry login failed: {0}")]
    Login(String),
    /// Handle disappeared
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("container cleanup failed: {0}")]
    Cleanup(String),
    #[error("log update failed: {0}")]
    UpdateLogs(String),
    /// Generic backend failure
    #[error("container engine error: {0}")]
    Engine(String),
}
