// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The incremental log-read algorithm shared by both backends.
//!
//! Backends fetch raw timestamped output (everything, or everything
//! since `log_read_at` minus a one-second safety margin — overlap is
//! expected) and hand it here. This module parses the leading RFC3339
//! timestamp off every line, skips lines at or before the cursor,
//! deletes any previously persisted rows at the new boundary, appends
//! the rest, and advances the cursor — in that order, so a crash at any
//! point leaves no duplicates behind.

use crate::error::EngineError;
use crate::LogHandler;
use chrono::DateTime;

/// Safety margin subtracted from the cursor when asking a backend for
/// "logs since": one second covers timestamp truncation on both sides.
pub const SINCE_MARGIN_SECS: u64 = 1;

/// Split a raw log line into its engine timestamp (epoch ms) and content.
///
/// Returns `None` for lines without a parseable leading timestamp.
pub fn parse_line(raw: &str) -> Option<(u64, &str)> {
    let (stamp, content) = raw.split_once(' ').unwrap_or((raw, ""));
    let parsed = DateTime::parse_from_rfc3339(stamp).ok()?;
    let ms = u64::try_from(parsed.timestamp_millis()).ok()?;
    Some((ms, content))
}

/// Apply a raw log batch to the handler per the incremental algorithm.
///
/// Returns the new cursor when any line was appended.
pub fn apply_raw_logs(
    raw: &str,
    log_handler: &dyn LogHandler,
) -> Result<Option<u64>, EngineError> {
    let cursor = log_handler.get_log_read_at();

    let mut fresh: Vec<(u64, &str)> = Vec::new();
    for line in raw.lines() {
        let Some((ts_ms, content)) = parse_line(line) else {
            tracing::debug!(line, "skipping log line without timestamp");
            continue;
        };
        if cursor.is_some_and(|c| ts_ms <= c) {
            continue;
        }
        fresh.push((ts_ms, content));
    }

    let Some(boundary) = fresh.iter().map(|(ts, _)| *ts).max() else {
        return Ok(None);
    };

    // Replay safety: rows at the new boundary may already be persisted
    // from a run that crashed before advancing the cursor.
    log_handler.clear_log_write_from(boundary)?;
    for (ts_ms, content) in fresh {
        log_handler.write(content, false, ts_ms)?;
    }
    log_handler.flush()?;
    log_handler.set_log_read_at(boundary)?;
    Ok(Some(boundary))
}

#[cfg(test)]
#[path = "logparse_tests.rs"]
mod tests;
