// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{harness, local_request};

#[tokio::test]
async fn dispose_kills_group_window_and_removes_record() {
    let h = harness();
    let outcome = h.manager.spawn(local_request(None)).await.unwrap();
    let session = outcome.session;
    let id = session.id.to_string();
    h.procs.add_live(session.pid);

    let report = h.manager.dispose(&id).await.unwrap();
    assert!(report.warnings.is_empty());

    assert!(h.procs.terminated_pids().contains(&session.pid));
    assert!(!h.mux.window(&session.tmux_session).unwrap().alive);
    assert!(h.manager.store().get_session(&id).is_none());
    assert!(h.manager.tracker(&id).is_none());
}

#[tokio::test]
async fn dispose_sweeps_workspace_orphans() {
    let h = harness();
    let outcome = h.manager.spawn(local_request(None)).await.unwrap();
    let session = outcome.session;
    let workspace = h
        .manager
        .store()
        .get_workspace(&session.workspace_id)
        .unwrap();

    // A forked child still working inside the workspace.
    h.procs.add_orphan(workspace.path.clone(), 7777);

    h.manager.dispose(session.id.as_str()).await.unwrap();

    let killed = h.procs.terminated_pids();
    assert!(killed.contains(&session.pid));
    assert!(killed.contains(&7777));
}

#[tokio::test]
async fn dispose_skips_the_session_pid_in_orphan_scan() {
    let h = harness();
    let outcome = h.manager.spawn(local_request(None)).await.unwrap();
    let session = outcome.session;
    let workspace = h
        .manager
        .store()
        .get_workspace(&session.workspace_id)
        .unwrap();

    // The pane pid shows up in the scan too; it must be killed exactly
    // once (by the group kill, not the orphan sweep).
    h.procs.add_orphan(workspace.path.clone(), session.pid);

    h.manager.dispose(session.id.as_str()).await.unwrap();
    let killed: Vec<i32> = h
        .procs
        .terminated_pids()
        .into_iter()
        .filter(|p| *p == session.pid)
        .collect();
    assert_eq!(killed.len(), 1);
}

#[tokio::test]
async fn dispose_keeps_the_workspace() {
    let h = harness();
    let outcome = h.manager.spawn(local_request(None)).await.unwrap();
    let workspace_id = outcome.session.workspace_id.clone();

    h.manager.dispose(outcome.session.id.as_str()).await.unwrap();
    assert!(h.manager.store().get_workspace(&workspace_id).is_some());
}

#[tokio::test]
async fn dispose_unknown_session_is_not_found() {
    let h = harness();
    let err = h.manager.dispose("ghost").await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}

#[tokio::test]
async fn dispose_remote_without_connection_warns_but_removes() {
    let h = harness();
    let mut session = sx_core::Session::test_local("r1", "ws1");
    session.remote_host_id = "host-gone".to_string();
    session.remote_window = "@3".to_string();
    h.manager.store().add_session(session);

    let report = h.manager.dispose("r1").await.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("no control connection"));
    assert!(h.manager.store().get_session("r1").is_none());
}

#[tokio::test]
async fn dispose_queued_remote_session_removes_record() {
    let h = harness();
    let outcome = h
        .manager
        .spawn_remote("devbox", "claude", "hi", None)
        .await
        .unwrap();
    let id = outcome.session.id.to_string();

    // Still provisioning: no remote window exists yet.
    let report = h.manager.dispose(&id).await.unwrap();
    assert!(h.manager.store().get_session(&id).is_none());
    assert!(report.warnings.is_empty());
}
