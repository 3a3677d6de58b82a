// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal emission policy.
//!
//! A non-working signal sets the session's nudge payload and bumps the
//! monotonic nudge sequence; a working signal clears the payload without
//! touching the sequence. The last-signal timestamp updates either way.

use sx_core::{nudge_payload, Signal, SignalState};
use sx_storage::{StateStore, StoreError};

/// Apply a signal to a session record and persist.
pub fn apply_signal(store: &StateStore, session_id: &str, signal: &Signal) -> Result<(), StoreError> {
    store.update_session_last_signal(session_id, signal.timestamp)?;
    match signal.state {
        SignalState::Working => {
            store.update_session_nudge(session_id, None)?;
        }
        state => {
            store.update_session_nudge(session_id, Some(nudge_payload(state, &signal.message)))?;
            let seq = store.increment_nudge_seq(session_id)?;
            tracing::debug!(session_id, state = %state, seq, "nudge updated");
        }
    }
    store.save()
}

/// The nudge label currently stored on a session, if any.
pub fn stored_nudge_label(session: &sx_core::Session) -> Option<String> {
    session
        .nudge
        .as_ref()
        .and_then(|n| n.get("state"))
        .and_then(|s| s.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
