// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{ContainerRequest, EngineExtra, PullPolicy, WorkerCmdline};
use rr_core::{ActivationId, ProcessId};

fn cmdline() -> WorkerCmdline {
    WorkerCmdline {
        ws_url: "ws://host:8000/ws/ansible-rulebook".into(),
        ws_ssl_verify: false,
        process_id: ProcessId::from_string("proc-1"),
        heartbeat_secs: 5,
        log_level: None,
        skip_audit_events: false,
    }
}

#[test]
fn worker_args_in_canonical_order() {
    let args = cmdline().to_args();
    assert_eq!(
        args,
        vec![
            "--worker",
            "--websocket-ssl-verify",
            "no",
            "--websocket-address",
            "ws://host:8000/ws/ansible-rulebook",
            "--id",
            "proc-1",
            "--heartbeat",
            "5",
        ]
    );
}

#[test]
fn log_level_and_audit_flags_are_appended() {
    let mut cmd = cmdline();
    cmd.log_level = Some("-vv".into());
    cmd.skip_audit_events = true;
    let args = cmd.to_args();
    assert_eq!(args[args.len() - 2], "--skip-audit-events");
    assert_eq!(args[args.len() - 1], "-vv");
}

#[test]
fn command_and_args_starts_with_binary() {
    let argv = cmdline().command_and_args();
    assert_eq!(argv[0], "ansible-rulebook");
    assert_eq!(argv.len(), 1 + cmdline().to_args().len());
}

#[test]
fn registry_is_first_segment() {
    let request = ContainerRequest {
        name: "rr-test".into(),
        image_url: "quay.io/ansible/ansible-rulebook:main".into(),
        pull_policy: PullPolicy::Always,
        cmdline: cmdline(),
        credential: None,
        ports: vec![],
        mem_limit: None,
        mounts: vec![],
        env_vars: vec![],
        extra: EngineExtra::None,
        parent_id: ActivationId::from_string("act-1"),
        process_id: ProcessId::from_string("proc-1"),
    };
    assert_eq!(request.registry(), "quay.io");
}

#[test]
fn pull_policy_uses_backend_spelling() {
    assert_eq!(PullPolicy::IfNotPresent.to_string(), "IfNotPresent");
}
