// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures for the engine crate.
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::manager::SessionManager;
use crate::spawn::SpawnRequest;
use crate::workspaces::WorkspaceSelector;
use std::sync::Arc;
use sx_adapters::{FakeMux, FakeProcesses};
use sx_core::Config;
use sx_storage::StateStore;

pub(crate) struct TestHarness {
    pub manager: Arc<SessionManager<FakeMux, FakeProcesses>>,
    pub mux: FakeMux,
    pub procs: FakeProcesses,
    pub dir: tempfile::TempDir,
}

pub(crate) fn harness() -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let mut config = Config::fresh();
    config.command_timeout_ms = 200;
    config.flavors.push(sx_core::Flavor::test_ssh("devbox"));
    let mux = FakeMux::new();
    let procs = FakeProcesses::new();
    let manager = SessionManager::new(
        Arc::clone(&store),
        mux.clone(),
        procs.clone(),
        config,
        dir.path().join("workspaces"),
    )
    .with_detected_tools(vec!["claude".to_string(), "codex".to_string()])
    // Supervisors must not spawn real attach processes under the fakes.
    .with_attach_fn(Arc::new(|_, _| {
        Err(sx_adapters::PtyError::NotAttached)
    }));
    TestHarness {
        manager: Arc::new(manager),
        mux,
        procs,
        dir,
    }
}

pub(crate) fn local_request(nickname: Option<&str>) -> SpawnRequest {
    SpawnRequest {
        workspace: WorkspaceSelector::RepoBranch {
            repo: "example/app".to_string(),
            branch: "main".to_string(),
            new_branch: None,
        },
        target: "claude".to_string(),
        prompt: "hi".to_string(),
        nickname: nickname.map(|n| n.to_string()),
        resume: false,
        command: None,
    }
}
