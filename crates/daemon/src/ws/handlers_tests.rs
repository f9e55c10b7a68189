// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::MessageContext;
use crate::env::Settings;
use crate::ws::messages::{InboundMessage, OutboundMessage};
use rr_core::{
    Activation, ActivationCredential, ActivationRequest, FakeClock, ProcessStatus,
    RulebookProcess,
};
use rr_storage::Store;
use uuid::Uuid;

struct Harness {
    store: Store,
    clock: FakeClock,
}

impl Harness {
    fn new() -> Self {
        let clock = FakeClock::new();
        clock.set_epoch_ms(1_000_000);
        Self { store: Store::new(), clock }
    }

    fn context(&self) -> MessageContext<FakeClock> {
        MessageContext::new(self.store.clone(), Settings::default(), self.clock.clone())
    }

    /// Insert an activation with a STARTING process; returns the process id.
    fn seeded_process(&self, activation: Activation) -> rr_core::ProcessId {
        let activation_id = activation.id.clone();
        self.store.insert_activation(activation).unwrap();
        let mut process = RulebookProcess::new(activation_id, "demo", 0);
        process.activation_pod_id = Some("pod-1".into());
        let pid = process.id.clone();
        self.store.insert_process(process, "q").unwrap();
        pid
    }

    fn parse(&self, json: &str) -> InboundMessage {
        serde_json::from_str(json).unwrap()
    }
}

fn response_types(responses: &[OutboundMessage]) -> Vec<&'static str> {
    responses
        .iter()
        .map(|r| match r {
            OutboundMessage::Rulebook { .. } => "Rulebook",
            OutboundMessage::ExtraVars { .. } => "ExtraVars",
            OutboundMessage::ControllerInfo { .. } => "ControllerInfo",
            OutboundMessage::VaultCollection { .. } => "VaultCollection",
            OutboundMessage::EndOfResponse => "EndOfResponse",
        })
        .collect()
}

// ── Worker handshake ─────────────────────────────────────────────────

#[test]
fn handshake_minimal_payload() {
    let h = Harness::new();
    let pid = h.seeded_process(Activation::builder().build());
    let responses = h
        .context()
        .handle(h.parse(&format!(r#"{{"type": "Worker", "activation_id": "{pid}"}}"#)));
    assert_eq!(response_types(&responses), vec!["Rulebook", "EndOfResponse"]);
}

#[test]
fn handshake_full_payload_in_order() {
    let h = Harness::new();
    let activation = {
        let mut a = Activation::builder().extra_var("---\ncollections: []\n").build();
        a.credentials = vec![
            ActivationCredential::Controller {
                url: "https://controller.example".into(),
                token: "tok".into(),
                ssl_verify: false,
            },
            ActivationCredential::VaultPassword { label: "adam".into(), password: "secret".into() },
        ];
        a
    };
    let pid = h.seeded_process(activation);

    let responses = h
        .context()
        .handle(h.parse(&format!(r#"{{"type": "Worker", "activation_id": "{pid}"}}"#)));
    assert_eq!(
        response_types(&responses),
        vec!["Rulebook", "ExtraVars", "ControllerInfo", "VaultCollection", "EndOfResponse"]
    );

    let OutboundMessage::ControllerInfo { ssl_verify, .. } = &responses[2] else {
        panic!("expected controller info");
    };
    assert_eq!(ssl_verify, "no");

    let OutboundMessage::VaultCollection { data } = &responses[3] else {
        panic!("expected vault collection");
    };
    assert_eq!(data[0].kind, "VaultPassword");
    assert_eq!(data[0].label, "adam");
}

#[test]
fn handshake_for_unknown_process_sends_nothing() {
    let h = Harness::new();
    let responses = h
        .context()
        .handle(h.parse(r#"{"type": "Worker", "activation_id": "proc-gone"}"#));
    assert!(responses.is_empty());
}

// ── SessionStats ─────────────────────────────────────────────────────

fn stats_json(pid: &rr_core::ProcessId, ruleset: &str, reported_at: &str) -> String {
    format!(
        r#"{{
            "type": "SessionStats",
            "activation_id": "{pid}",
            "stats": {{"ruleSetName": "{ruleset}", "numberOfRules": 1}},
            "reported_at": "{reported_at}"
        }}"#
    )
}

#[test]
fn heartbeat_stamps_updated_at_and_merges_stats() {
    let h = Harness::new();
    let pid = h.seeded_process(Activation::builder().status(ProcessStatus::Running).build());

    h.context()
        .handle(h.parse(&stats_json(&pid, "rs1", "2024-05-01T10:00:00.000Z")));
    h.context()
        .handle(h.parse(&stats_json(&pid, "rs2", "2024-05-01T10:00:05.000Z")));

    let process = h.store.get_process(&pid).unwrap();
    assert!(process.has_heartbeat());

    let activation = h.store.get_activation(&process.activation_id).unwrap();
    let keys: Vec<_> = activation.ruleset_stats.keys().cloned().collect();
    assert_eq!(keys, vec!["rs1", "rs2"]);
}

#[test]
fn heartbeat_on_starting_activation_kicks_a_monitor() {
    let h = Harness::new();
    let pid = h.seeded_process(Activation::builder().status(ProcessStatus::Starting).build());

    h.context()
        .handle(h.parse(&stats_json(&pid, "rs1", "2024-05-01T10:00:00.000Z")));

    let activation_id = h.store.get_process(&pid).unwrap().activation_id;
    let kinds: Vec<_> = h
        .store
        .pending_requests(&activation_id)
        .iter()
        .map(|r| r.request)
        .collect();
    assert_eq!(kinds, vec![ActivationRequest::Monitor]);
}

#[test]
fn heartbeat_on_running_activation_stays_quiet() {
    let h = Harness::new();
    let pid = h.seeded_process(Activation::builder().status(ProcessStatus::Running).build());
    h.context()
        .handle(h.parse(&stats_json(&pid, "rs1", "2024-05-01T10:00:00.000Z")));
    let activation_id = h.store.get_process(&pid).unwrap().activation_id;
    assert!(!h.store.has_pending_request(&activation_id));
}

// ── Job / AnsibleEvent ───────────────────────────────────────────────

#[test]
fn job_message_creates_instance_and_links_process() {
    let h = Harness::new();
    let pid = h.seeded_process(Activation::builder().build());
    let job_uuid = "940730a1-8b6f-45f3-84c9-bde8f04390e0";

    h.context().handle(h.parse(&format!(
        r#"{{
            "type": "Job",
            "job_id": "{job_uuid}",
            "ansible_rulebook_id": "{pid}",
            "name": "ansible.eda.hello",
            "ruleset": "ruleset",
            "rule": "rule",
            "hosts": "hosts",
            "action": "run_playbook"
        }}"#
    )));

    let job = h.store.get_job_instance(&Uuid::parse_str(job_uuid).unwrap()).unwrap();
    assert_eq!(job.name, "ansible.eda.hello");
    assert_eq!(
        h.store.get_process(&pid).unwrap().current_job_id.as_deref(),
        Some(job_uuid)
    );
}

#[test]
fn ansible_event_appends_to_its_job() {
    let h = Harness::new();
    let pid = h.seeded_process(Activation::builder().build());
    let job_uuid = Uuid::new_v4();
    h.store
        .insert_job_instance(rr_core::JobInstance {
            uuid: job_uuid,
            process_id: pid,
            name: "job".into(),
            ruleset: "rs".into(),
            action: "run_playbook".into(),
            hosts: "all".into(),
        })
        .unwrap();

    h.context().handle(h.parse(&format!(
        r#"{{
            "type": "AnsibleEvent",
            "event": {{
                "event": "verbose",
                "job_id": "{job_uuid}",
                "counter": 1,
                "stdout": "the playbook is completed"
            }}
        }}"#
    )));

    assert_eq!(h.store.job_event_count(&job_uuid), 1);
}

// ── Action ───────────────────────────────────────────────────────────

fn action_json(pid: &rr_core::ProcessId, action_uuid: &Uuid, rule_uuid: &Uuid) -> String {
    let event_uuid = Uuid::new_v4();
    format!(
        r#"{{
            "type": "Action",
            "action": "run_job_template",
            "action_uuid": "{action_uuid}",
            "activation_id": "{pid}",
            "ruleset": "ruleset",
            "rule": "rule",
            "ruleset_uuid": "8472ff2c-6045-4418-8d4e-46f6cffc8557",
            "rule_uuid": "{rule_uuid}",
            "run_at": "2023-03-29T15:00:17.260803Z",
            "rule_run_at": "2023-03-29T15:00:17.260803Z",
            "matching_events": {{
                "m_0": {{
                    "meta": {{
                        "received_at": "2023-03-29T15:00:17.260803Z",
                        "source": {{"name": "my test source", "type": "ansible.eda.range"}},
                        "uuid": "{event_uuid}"
                    }},
                    "i": 3
                }}
            }},
            "status": "successful",
            "message": "Action run successfully",
            "url": "http://controller.com/jobs/1/",
            "controller_job_id": "55"
        }}"#
    )
}

#[test]
fn action_records_rule_action_and_events() {
    let h = Harness::new();
    let activation = {
        let mut a = Activation::builder().build();
        a.credentials = vec![ActivationCredential::Controller {
            url: "http://gw/api/controller".into(),
            token: "tok".into(),
            ssl_verify: false,
        }];
        a
    };
    let pid = h.seeded_process(activation);
    let action_uuid = Uuid::new_v4();
    let rule_uuid = Uuid::new_v4();

    h.context().handle(h.parse(&action_json(&pid, &action_uuid, &rule_uuid)));

    let rule = h.store.get_audit_rule(&rule_uuid).unwrap();
    assert_eq!(rule.name, "rule");
    assert_eq!(rule.status, "successful");

    let action = h.store.get_audit_action(&action_uuid).unwrap();
    assert_eq!(action.url, "http://gw/execution/jobs/playbook/55/details/");

    assert_eq!(h.store.audit_events_for_action(&action_uuid).len(), 1);
}

#[test]
fn repeated_action_delivery_is_idempotent() {
    let h = Harness::new();
    let pid = h.seeded_process(Activation::builder().build());
    let action_uuid = Uuid::new_v4();
    let rule_uuid = Uuid::new_v4();
    let payload = action_json(&pid, &action_uuid, &rule_uuid);

    h.context().handle(h.parse(&payload));
    h.context().handle(h.parse(&payload));

    assert!(h.store.get_audit_action(&action_uuid).is_some());
    assert_eq!(h.store.audit_events_for_action(&action_uuid).len(), 1);
}
