// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session record and window-name derivation.
//!
//! A Session tracks one agent process running inside a multiplexer window,
//! either on the local machine or on a remote host reached via control mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an agent session (`<workspace_id>-<short_uuid>`).
    pub struct SessionId;
}

/// Lifecycle status of a session.
///
/// Remote sessions queued on a disconnected control channel start as
/// `Provisioning` and transition to `Running` or `Failed` when the queue
/// drains. Local sessions are inserted as `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Provisioning,
    Running,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Provisioning => write!(f, "provisioning"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub workspace_id: String,
    /// Resolved target name (e.g. "claude").
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Multiplexer window name, derived from the nickname or session id.
    pub tmux_session: String,
    pub created_at: DateTime<Utc>,
    /// Pane process id; 0 for remote sessions.
    #[serde(default)]
    pub pid: i32,
    #[serde(default)]
    pub remote_host_id: String,
    #[serde(default)]
    pub remote_pane_id: String,
    #[serde(default)]
    pub remote_window: String,
    pub status: SessionStatus,
    /// Opaque nudge payload (`{state, summary, source}`), None when working.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge: Option<serde_json::Value>,
    /// Monotonic counter, bumped once per accepted non-working signal.
    #[serde(default)]
    pub nudge_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_signal_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session is remote iff it carries a remote host id.
    pub fn is_remote(&self) -> bool {
        !self.remote_host_id.is_empty()
    }

    /// Window name for this session: sanitized nickname, or the session id.
    pub fn window_name(nickname: Option<&str>, id: &SessionId) -> String {
        match nickname {
            Some(n) if !n.is_empty() => sanitize_window_name(n),
            _ => id.to_string(),
        }
    }
}

/// Sanitize a nickname into a valid multiplexer window name.
///
/// tmux treats `.` and `:` as pane/window separators in target specs, so
/// both are replaced with `-`.
pub fn sanitize_window_name(name: &str) -> String {
    name.replace(['.', ':'], "-")
}

#[cfg(any(test, feature = "test-support"))]
impl Session {
    /// Minimal local session for tests.
    pub fn test_local(id: &str, workspace_id: &str) -> Self {
        Self {
            id: SessionId::new(id),
            workspace_id: workspace_id.to_string(),
            target: "claude".to_string(),
            nickname: None,
            tmux_session: id.to_string(),
            created_at: Utc::now(),
            pid: 0,
            remote_host_id: String::new(),
            remote_pane_id: String::new(),
            remote_window: String::new(),
            status: SessionStatus::Running,
            nudge: None,
            nudge_seq: 0,
            last_signal_at: None,
            last_output_at: None,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
