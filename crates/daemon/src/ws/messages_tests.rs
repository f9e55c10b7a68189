// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{rewrite_job_url, InboundMessage, OutboundMessage};

#[test]
fn inbound_messages_parse_by_tag() {
    let worker: InboundMessage =
        serde_json::from_str(r#"{"type": "Worker", "activation_id": "proc-1"}"#).unwrap();
    assert!(matches!(worker, InboundMessage::Worker(w) if w.activation_id == "proc-1"));

    let stats: InboundMessage = serde_json::from_str(
        r#"{
            "type": "SessionStats",
            "activation_id": "proc-1",
            "stats": {"ruleSetName": "rs1", "numberOfRules": 1},
            "reported_at": "2024-05-01T10:00:00.000Z"
        }"#,
    )
    .unwrap();
    assert!(matches!(stats, InboundMessage::SessionStats(_)));

    let job: InboundMessage = serde_json::from_str(
        r#"{
            "type": "Job",
            "job_id": "940730a1-8b6f-45f3-84c9-bde8f04390e0",
            "ansible_rulebook_id": "proc-1",
            "name": "ansible.eda.hello",
            "ruleset": "ruleset",
            "rule": "rule",
            "hosts": "hosts",
            "action": "run_playbook"
        }"#,
    )
    .unwrap();
    assert!(matches!(job, InboundMessage::Job(_)));
}

#[test]
fn unknown_tag_is_rejected() {
    assert!(serde_json::from_str::<InboundMessage>(r#"{"type": "Shutdown"}"#).is_err());
}

#[test]
fn outbound_end_of_response_serializes_with_tag_only() {
    let json = serde_json::to_string(&OutboundMessage::EndOfResponse).unwrap();
    assert_eq!(json, r#"{"type":"EndOfResponse"}"#);
}

#[test]
fn controller_info_serializes_flat() {
    let json = serde_json::to_value(OutboundMessage::ControllerInfo {
        url: "https://controller".into(),
        token: "tok".into(),
        ssl_verify: "no".into(),
    })
    .unwrap();
    assert_eq!(json["type"], "ControllerInfo");
    assert_eq!(json["token"], "tok");
}

// ── url rewriting ────────────────────────────────────────────────────

#[yare::parameterized(
    gateway_playbook = {
        "run_job_template", "55", "http://gw/api/controller",
        Some("http://gw/execution/jobs/playbook/55/details/")
    },
    gateway_workflow = {
        "run_workflow_template", "55", "http://gw/api/controller",
        Some("http://gw/execution/jobs/workflow/55/details/")
    },
    gateway_trailing_slash = {
        "run_job_template", "55", "http://gw/api/controller/",
        Some("http://gw/execution/jobs/playbook/55/details/")
    },
    controller_playbook = {
        "run_job_template", "55", "http://controller.com",
        Some("http://controller.com/#/jobs/playbook/55/details/")
    },
    controller_workflow_slash = {
        "run_workflow_template", "55", "http://controller.com/",
        Some("http://controller.com/#/jobs/workflow/55/details/")
    },
    no_job_id = { "run_workflow_template", "", "http://controller.com", None },
    other_action = { "run_playbook", "55", "http://controller.com", None },
)]
fn url_rewrite(
    action: &str,
    controller_job_id: &str,
    api_url: &str,
    expected: Option<&str>,
) {
    assert_eq!(
        rewrite_job_url(action, controller_job_id, api_url).as_deref(),
        expected
    );
}
