// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sx_core::{Session, Workspace};

#[test]
fn empty_state_roundtrips() {
    let state = StateData::default();
    let json = serde_json::to_string(&state).unwrap();
    let back: StateData = serde_json::from_str(&json).unwrap();
    assert!(back.sessions.is_empty());
    assert!(back.workspaces.is_empty());
    assert!(back.hosts.is_empty());
}

#[test]
fn populated_state_roundtrips() {
    let mut state = StateData::default();
    let session = Session::test_local("ws1-abc", "ws1");
    let workspace = Workspace::test_local("ws1", "/tmp/ws1");
    state.sessions.insert(session.id.to_string(), session);
    state
        .workspaces
        .insert(workspace.id.to_string(), workspace);

    let json = serde_json::to_string(&state).unwrap();
    let back: StateData = serde_json::from_str(&json).unwrap();
    assert_eq!(back.sessions.len(), 1);
    assert_eq!(back.workspaces.len(), 1);
    assert!(back.sessions.contains_key("ws1-abc"));
}

#[test]
fn missing_maps_default_to_empty() {
    let back: StateData = serde_json::from_str("{}").unwrap();
    assert!(back.sessions.is_empty());
    assert!(back.hosts.is_empty());
}
