// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process table operations.

use super::Store;
use crate::error::StoreError;
use rr_core::{ActivationId, ProcessId, ProcessStatus, RulebookProcess};

impl Store {
    /// Create a process, pin it to `queue_name`, and make it the parent
    /// activation's latest process — one transaction, so a crash cannot
    /// leave a process without its pin or an activation pointing at a
    /// process that does not exist.
    pub fn insert_process(
        &self,
        process: RulebookProcess,
        queue_name: &str,
    ) -> Result<(), StoreError> {
        self.write(|t| {
            let activation = t
                .activations
                .get_mut(&process.activation_id)
                .ok_or_else(|| {
                    StoreError::not_found("activation", process.activation_id.as_str())
                })?;
            activation.latest_process = Some(process.id.clone());
            t.process_queue.insert(process.id.clone(), queue_name.to_string());
            t.processes.insert(process.id.clone(), process);
            Ok(())
        })
    }

    pub fn get_process(&self, id: &ProcessId) -> Result<RulebookProcess, StoreError> {
        self.read(|t| {
            t.processes
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("process", id.as_str()))
        })
    }

    /// The activation's latest process, if any.
    pub fn latest_process(
        &self,
        activation_id: &ActivationId,
    ) -> Result<Option<RulebookProcess>, StoreError> {
        self.read(|t| {
            let activation = t
                .activations
                .get(activation_id)
                .ok_or_else(|| StoreError::not_found("activation", activation_id.as_str()))?;
            Ok(activation
                .latest_process
                .as_ref()
                .and_then(|pid| t.processes.get(pid))
                .cloned())
        })
    }

    /// All processes of an activation, oldest first.
    pub fn processes_for_activation(&self, activation_id: &ActivationId) -> Vec<RulebookProcess> {
        let mut processes: Vec<_> = self.read(|t| {
            t.processes
                .values()
                .filter(|p| &p.activation_id == activation_id)
                .cloned()
                .collect()
        });
        processes.sort_by_key(|p| p.started_at_ms);
        processes
    }

    pub fn update_process(
        &self,
        id: &ProcessId,
        f: impl FnOnce(&mut RulebookProcess),
    ) -> Result<RulebookProcess, StoreError> {
        self.write(|t| {
            let process = t
                .processes
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("process", id.as_str()))?;
            f(process);
            Ok(process.clone())
        })
    }

    /// The worker queue a process is pinned to.
    pub fn queue_for_process(&self, id: &ProcessId) -> Option<String> {
        self.read(|t| t.process_queue.get(id).cloned())
    }

    /// The worker queue serving an activation: the pin of its latest
    /// process. `None` for an activation that never started.
    pub fn queue_for_activation(&self, activation_id: &ActivationId) -> Option<String> {
        self.read(|t| {
            t.activations
                .get(activation_id)?
                .latest_process
                .as_ref()
                .and_then(|pid| t.process_queue.get(pid))
                .cloned()
        })
    }

    /// Unpin the activation's latest process from its worker queue, so
    /// the next request can be adopted by any live queue (force restart
    /// away from an offline worker).
    pub fn clear_queue_pin(&self, activation_id: &ActivationId) {
        self.write(|t| {
            let latest = t
                .activations
                .get(activation_id)
                .and_then(|a| a.latest_process.clone());
            if let Some(pid) = latest {
                t.process_queue.remove(&pid);
            }
        });
    }

    /// Node-local admission count: processes in RUNNING or STARTING pinned
    /// to this queue. Computed from the store, never from worker memory.
    pub fn count_active_on_queue(&self, queue_name: &str) -> usize {
        self.read(|t| {
            t.processes
                .values()
                .filter(|p| {
                    matches!(p.status, ProcessStatus::Running | ProcessStatus::Starting)
                        && t.process_queue.get(&p.id).map(String::as_str) == Some(queue_name)
                })
                .count()
        })
    }

    /// Processes pinned to a queue that are not in a terminal status.
    pub fn live_processes_on_queue(&self, queue_name: &str) -> Vec<RulebookProcess> {
        self.read(|t| {
            t.processes
                .values()
                .filter(|p| {
                    !p.status.is_terminal()
                        && t.process_queue.get(&p.id).map(String::as_str) == Some(queue_name)
                })
                .cloned()
                .collect()
        })
    }
}
