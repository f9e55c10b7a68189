// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activation table operations.

use super::Store;
use crate::error::StoreError;
use rr_core::{Activation, ActivationId, ProcessStatus};

impl Store {
    /// Insert a new activation. Names are unique.
    pub fn insert_activation(&self, activation: Activation) -> Result<(), StoreError> {
        self.write(|t| {
            if t.activations.contains_key(&activation.id) {
                return Err(StoreError::Conflict(format!(
                    "activation {} already exists",
                    activation.id
                )));
            }
            if t.activations.values().any(|a| a.name == activation.name) {
                return Err(StoreError::Conflict(format!(
                    "activation name {:?} already taken",
                    activation.name
                )));
            }
            t.activations.insert(activation.id.clone(), activation);
            Ok(())
        })
    }

    /// Fresh copy of an activation row.
    pub fn get_activation(&self, id: &ActivationId) -> Result<Activation, StoreError> {
        self.read(|t| {
            t.activations
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("activation", id.as_str()))
        })
    }

    pub fn list_activations(&self) -> Vec<Activation> {
        self.read(|t| t.activations.values().cloned().collect())
    }

    /// Activations currently in one of the given statuses.
    pub fn activations_with_status(&self, statuses: &[ProcessStatus]) -> Vec<Activation> {
        self.read(|t| {
            t.activations
                .values()
                .filter(|a| statuses.contains(&a.status))
                .cloned()
                .collect()
        })
    }

    /// Apply `f` to the activation row in one transaction and return the
    /// updated copy. Callers needing read-modify-write atomicity against
    /// other writers take the row lock first.
    pub fn update_activation(
        &self,
        id: &ActivationId,
        f: impl FnOnce(&mut Activation),
    ) -> Result<Activation, StoreError> {
        self.write(|t| {
            let activation = t
                .activations
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("activation", id.as_str()))?;
            f(activation);
            Ok(activation.clone())
        })
    }

    /// Delete an activation and everything it owns: processes, their logs
    /// and queue pins, and any pending requests.
    pub fn remove_activation(&self, id: &ActivationId) -> Result<Activation, StoreError> {
        self.write(|t| {
            let activation = t
                .activations
                .remove(id)
                .ok_or_else(|| StoreError::not_found("activation", id.as_str()))?;

            let owned: Vec<_> = t
                .processes
                .values()
                .filter(|p| &p.activation_id == id)
                .map(|p| p.id.clone())
                .collect();
            for process_id in owned {
                t.processes.remove(&process_id);
                t.process_queue.remove(&process_id);
                t.logs.remove(&process_id);
            }
            t.requests.retain(|r| &r.activation_id != id);
            Ok(activation)
        })
    }
}
