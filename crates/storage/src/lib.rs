// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rr-storage: the orchestrator's record store.
//!
//! An in-memory transactional store with the semantics the core needs
//! from a database:
//!
//! - **Atomic multi-row updates** — one writer lock over the table set;
//!   every store method is a single transaction.
//! - **Row-level locking** — a per-activation async mutex
//!   ([`store::RowLock`]) serializes read-modify-write sequences on one
//!   activation without blocking the rest of the store. The lock is never
//!   held across an engine call.
//! - **FIFO request queue** — insertion-ordered rows with delayed
//!   visibility, the only cross-worker channel.
//! - **Wake primitive** — a per-worker-queue `Notify` so request
//!   producers can nudge the consuming worker.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{ProcessLogLine, RowLock, Store};
