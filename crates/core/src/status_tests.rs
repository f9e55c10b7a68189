// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ProcessStatus::{self, *};

const ALL: [ProcessStatus; 11] = [
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
    Error,
    Deleting,
    Unresponsive,
    WorkersOffline,
];

#[test]
fn terminal_statuses_are_the_four_end_states() {
    let terminal: Vec<_> = ALL.into_iter().filter(|s| s.is_terminal()).collect();
    assert_eq!(terminal, vec![Stopped, Completed, Failed, Error]);
}

#[test]
fn self_transition_always_allowed() {
    for status in ALL {
        assert!(status.may_transition(status), "{status} -> {status} refused");
    }
}

#[test]
fn deleting_is_a_sink() {
    for to in ALL {
        if to != Deleting {
            assert!(!Deleting.may_transition(to), "deleting -> {to} allowed");
        }
    }
}

#[yare::parameterized(
    heartbeat_promotes      = { Starting, Running, true },
    short_run_completes     = { Starting, Completed, true },
    stop_finalizes          = { Stopping, Stopped, true },
    offline_recovers        = { WorkersOffline, Running, true },
    capacity_postpones      = { Starting, Pending, true },
    restart_from_failed     = { Failed, Starting, true },
    monitor_cannot_resurrect_stopping = { Stopping, Running, false },
    stopped_is_not_running  = { Stopped, Running, false },
    completed_not_failed    = { Completed, Failed, false },
    pending_never_runs_directly = { Pending, Running, false },
)]
fn transition_table(from: ProcessStatus, to: ProcessStatus, allowed: bool) {
    assert_eq!(from.may_transition(to), allowed, "{from} -> {to}");
}

#[test]
fn monitored_statuses() {
    let monitored: Vec<_> = ALL.into_iter().filter(|s| s.is_monitored()).collect();
    assert_eq!(monitored, vec![Starting, Running, WorkersOffline]);
}

#[test]
fn display_is_snake_case() {
    assert_eq!(WorkersOffline.to_string(), "workers_offline");
    assert_eq!(Unresponsive.to_string(), "unresponsive");
}
