// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Delay before a tracker reattaches after a PTY read error (default: 500ms).
pub fn reattach_delay() -> Duration {
    parse_duration_ms("SCHMUX_REATTACH_DELAY_MS").unwrap_or(Duration::from_millis(500))
}

/// Timeout for control-mode command replies (default: 5000ms).
pub fn control_reply_timeout() -> Duration {
    parse_duration_ms("SCHMUX_CONTROL_REPLY_MS").unwrap_or(Duration::from_secs(5))
}

/// Grace period between SIGTERM and SIGKILL on dispose (default: 500ms).
pub fn kill_grace() -> Duration {
    parse_duration_ms("SCHMUX_KILL_GRACE_MS").unwrap_or(Duration::from_millis(500))
}
