// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::DbLogger;
use crate::env::FlushAfter;
use rr_core::{Activation, FakeClock, RulebookProcess};
use rr_engine::LogHandler;
use rr_storage::Store;

fn seeded() -> (Store, rr_core::ProcessId) {
    let store = Store::new();
    let activation = Activation::builder().build();
    let id = activation.id.clone();
    store.insert_activation(activation).unwrap();
    let process = RulebookProcess::new(id, "demo", 0);
    let pid = process.id.clone();
    store.insert_process(process, "q").unwrap();
    (store, pid)
}

fn logger(store: &Store, pid: &rr_core::ProcessId, flush_after: FlushAfter) -> DbLogger<FakeClock> {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_700_000_000_000);
    DbLogger::new(store.clone(), pid.clone(), flush_after, clock)
}

#[test]
fn end_mode_buffers_until_flush() {
    let (store, pid) = seeded();
    let logger = logger(&store, &pid, FlushAfter::End);
    logger.write("one", false, 1_000).unwrap();
    logger.write("two", false, 2_000).unwrap();
    assert_eq!(store.log_line_count(&pid), 0);
    logger.flush().unwrap();
    assert_eq!(store.log_line_count(&pid), 2);
}

#[test]
fn incremental_mode_flushes_every_n_lines() {
    let (store, pid) = seeded();
    let logger = logger(&store, &pid, FlushAfter::Lines(2));
    logger.write("one", false, 1_000).unwrap();
    logger.write("two", false, 2_000).unwrap();
    // The third write crosses the boundary and flushes the first batch.
    logger.write("three", false, 3_000).unwrap();
    assert_eq!(store.log_line_count(&pid), 2);
    logger.flush().unwrap();
    assert_eq!(store.log_line_count(&pid), 3);
}

#[test]
fn explicit_flush_on_write() {
    let (store, pid) = seeded();
    let logger = logger(&store, &pid, FlushAfter::End);
    logger.write("now", true, 5_000).unwrap();
    assert_eq!(store.log_line_count(&pid), 1);
}

#[test]
fn messages_are_stamped_and_keyed_zero() {
    let (store, pid) = seeded();
    let logger = logger(&store, &pid, FlushAfter::End);
    logger.write_message("Starting Container", true).unwrap();
    let rows = store.logs_for_process(&pid);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].log_timestamp_ms, 0);
    assert!(rows[0].line.ends_with("Starting Container"));
    assert!(rows[0].line.starts_with("2023-"), "line: {}", rows[0].line);
}

#[test]
fn cursor_round_trips_through_the_process_row() {
    let (store, pid) = seeded();
    let logger = logger(&store, &pid, FlushAfter::End);
    assert_eq!(logger.get_log_read_at(), None);
    logger.set_log_read_at(42_500).unwrap();
    assert_eq!(logger.get_log_read_at(), Some(42_500));
    assert_eq!(store.get_process(&pid).unwrap().log_read_at_ms, Some(42_500));
}

#[test]
fn clear_log_write_from_deletes_boundary_rows() {
    let (store, pid) = seeded();
    let logger = logger(&store, &pid, FlushAfter::End);
    logger.write("a", false, 9_000).unwrap();
    logger.write("b", false, 9_500).unwrap();
    logger.flush().unwrap();
    logger.clear_log_write_from(9_000).unwrap();
    let rows = store.logs_for_process(&pid);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].line, "b");
}

#[test]
fn flush_after_delete_reports_update_logs_error() {
    let (store, pid) = seeded();
    let logger = logger(&store, &pid, FlushAfter::End);
    logger.write("orphan", false, 1_000).unwrap();
    store.remove_activation(&store.get_process(&pid).unwrap().activation_id).unwrap();
    assert!(logger.flush().is_err());
}
