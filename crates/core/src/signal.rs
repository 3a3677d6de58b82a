// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal events parsed from agent output and their nudge mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-level agent state extracted from terminal output or the signal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    Working,
    NeedsInput,
    Completed,
    Error,
}

impl SignalState {
    /// Parse the wire form used in signal files and status tokens.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "working" => Some(SignalState::Working),
            "needs_input" => Some(SignalState::NeedsInput),
            "completed" => Some(SignalState::Completed),
            "error" => Some(SignalState::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalState::Working => "working",
            SignalState::NeedsInput => "needs_input",
            SignalState::Completed => "completed",
            SignalState::Error => "error",
        }
    }

    /// Dashboard nudge label for this state.
    ///
    /// `needs_input` is refined by the signal summary: agents asking for
    /// feature clarification or user testing get their own labels, anything
    /// else is an authorization ask.
    pub fn nudge_label(&self, summary: &str) -> &'static str {
        match self {
            SignalState::Working => "Working",
            SignalState::Completed => "Completed",
            SignalState::Error => "Error",
            SignalState::NeedsInput => {
                let lower = summary.to_lowercase();
                if lower.contains("clarif") {
                    "Needs Feature Clarification"
                } else if lower.contains("test") {
                    "Needs User Testing"
                } else {
                    "Needs Authorization"
                }
            }
        }
    }
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A discrete state-change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub state: SignalState,
    /// Human-readable summary from the agent ("waiting for approval", ...).
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn now(state: SignalState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Nudge payload stored on the session record for non-working signals.
pub fn nudge_payload(state: SignalState, summary: &str) -> serde_json::Value {
    serde_json::json!({
        "state": state.nudge_label(summary),
        "summary": summary,
        "source": "agent",
    })
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
