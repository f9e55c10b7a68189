// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{Activation, ActivationCredential, RestartPolicy};
use crate::status::ProcessStatus;

#[test]
fn new_activation_is_enabled_and_pending() {
    let act = Activation::new("smoke", "---\n[]");
    assert!(act.is_enabled);
    assert_eq!(act.status, ProcessStatus::Pending);
    assert_eq!(act.restart_policy, RestartPolicy::OnFailure);
    assert_eq!(act.failure_count, 0);
    assert!(act.latest_process.is_none());
}

#[test]
fn controller_credential_lookup() {
    let mut act = Activation::new("creds", "");
    assert!(act.controller_credential().is_none());

    act.credentials.push(ActivationCredential::VaultPassword {
        label: "adam".into(),
        password: "secret".into(),
    });
    act.credentials.push(ActivationCredential::Controller {
        url: "https://controller.example".into(),
        token: "tok".into(),
        ssl_verify: false,
    });

    assert!(matches!(
        act.controller_credential(),
        Some(ActivationCredential::Controller { .. })
    ));
    assert_eq!(act.vault_passwords().len(), 1);
}

#[test]
fn builder_defaults_are_startable() {
    let act = Activation::builder().build();
    assert!(act.is_enabled);
    assert!(act.decision_environment.is_some());
    assert_eq!(act.restart_policy, RestartPolicy::Never);
}

#[test]
fn restart_policy_display() {
    assert_eq!(RestartPolicy::OnFailure.to_string(), "on-failure");
    assert_eq!(RestartPolicy::Always.to_string(), "always");
}
