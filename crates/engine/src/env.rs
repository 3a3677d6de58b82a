// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Activity debounce window for last-output updates (default: 500ms).
pub fn activity_debounce() -> Duration {
    parse_duration_ms("SCHMUX_ACTIVITY_DEBOUNCE_MS").unwrap_or(Duration::from_millis(500))
}

/// Throttle for tracker retry log lines (default: 15s).
pub fn retry_log_throttle() -> Duration {
    parse_duration_ms("SCHMUX_RETRY_LOG_MS").unwrap_or(Duration::from_secs(15))
}

/// How long send_input waits for a PTY before falling back to send-keys
/// (default: 100ms).
pub fn input_pty_wait() -> Duration {
    parse_duration_ms("SCHMUX_INPUT_PTY_WAIT_MS").unwrap_or(Duration::from_millis(100))
}
