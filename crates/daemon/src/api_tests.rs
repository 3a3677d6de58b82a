// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::AppState;
use axum::http::header::AUTHORIZATION;
use std::sync::Arc;
use sx_adapters::{FakeMux, FakeProcesses};
use sx_core::Config;
use sx_engine::SessionManager;
use sx_storage::StateStore;

struct Harness {
    state: AppState<FakeMux, FakeProcesses>,
    mux: FakeMux,
    _dir: tempfile::TempDir,
}

fn harness_with_config(mutate: impl FnOnce(&mut Config)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let mut config = Config::fresh();
    config.command_timeout_ms = 200;
    mutate(&mut config);
    let mux = FakeMux::new();
    let manager = SessionManager::new(
        Arc::clone(&store),
        mux.clone(),
        FakeProcesses::new(),
        config,
        dir.path().join("workspaces"),
    )
    .with_detected_tools(vec!["claude".to_string()])
    .with_attach_fn(Arc::new(|_, _| Err(sx_adapters::PtyError::NotAttached)));
    Harness {
        state: AppState::new(Arc::new(manager)),
        mux,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with_config(|_| {})
}

fn spawn_body() -> SpawnBody {
    SpawnBody {
        repo: "example/app".to_string(),
        branch: "main".to_string(),
        prompt: "hi".to_string(),
        targets: [("claude".to_string(), 1)].into_iter().collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn spawn_returns_one_result_per_instance() {
    let h = harness();
    let mut body = spawn_body();
    body.targets.insert("claude".to_string(), 3);

    let Json(results) = spawn_sessions(
        State(h.state.clone()),
        HeaderMap::new(),
        Json(body),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 3);
    for result in &results {
        assert!(result.error.is_none());
        assert!(!result.session_id.is_empty());
        assert_eq!(result.target, "claude");
        assert!(result.command.contains("claude"));
    }
    assert_eq!(h.state.manager.list_sessions().len(), 3);
}

#[tokio::test]
async fn spawn_with_unknown_target_reports_error_in_element() {
    let h = harness();
    let mut body = spawn_body();
    body.targets = [("mystery".to_string(), 1)].into_iter().collect();

    let Json(results) = spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(body))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let error = results[0].error.as_ref().unwrap();
    assert!(error.contains("target not found"));
    assert!(h.state.manager.list_sessions().is_empty());
}

#[tokio::test]
async fn spawn_requires_targets_xor_command() {
    let h = harness();

    let mut both = spawn_body();
    both.command = "htop".to_string();
    assert!(
        spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(both))
            .await
            .is_err()
    );

    let mut neither = spawn_body();
    neither.targets.clear();
    assert!(
        spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(neither))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn spawn_with_raw_command_creates_command_session() {
    let h = harness();
    let mut body = spawn_body();
    body.targets.clear();
    body.prompt = String::new();
    body.command = "npm run watch".to_string();

    let Json(results) = spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(body))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].error.is_none());
    assert!(results[0].command.contains("npm run watch"));
}

#[tokio::test]
async fn spawn_without_workspace_fields_fails_per_element() {
    let h = harness();
    let mut body = spawn_body();
    body.repo = String::new();
    body.branch = String::new();

    let Json(results) = spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(body))
        .await
        .unwrap();
    assert!(results[0].error.is_some());
}

#[tokio::test]
async fn dispose_returns_ok_and_removes_session() {
    let h = harness();
    let Json(results) = spawn_sessions(
        State(h.state.clone()),
        HeaderMap::new(),
        Json(spawn_body()),
    )
    .await
    .unwrap();
    let id = results[0].session_id.clone();

    let Json(value) = dispose_session(
        State(h.state.clone()),
        Path(id.clone()),
        HeaderMap::new(),
    )
    .await
    .unwrap();

    assert_eq!(value["status"], "ok");
    assert!(h.state.manager.store().get_session(&id).is_none());
}

#[tokio::test]
async fn workspace_dispose_removes_all_its_sessions() {
    let h = harness();
    let mut body = spawn_body();
    body.targets.insert("claude".to_string(), 2);
    let Json(results) = spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(body))
        .await
        .unwrap();
    let workspace_id = results[0].workspace_id.clone();

    let Json(value) = dispose_workspace(
        State(h.state.clone()),
        Path(workspace_id.clone()),
        HeaderMap::new(),
    )
    .await
    .unwrap();
    assert_eq!(value["status"], "ok");

    assert!(h.state.manager.list_sessions().is_empty());
    // Windows went down with the sessions; the workspace record stays.
    for result in &results {
        let session_window = h.mux.window(&result.session_id);
        assert!(session_window.map(|w| !w.alive).unwrap_or(true));
    }
    assert!(h.state.manager.store().get_workspace(&workspace_id).is_some());
}

#[tokio::test]
async fn workspace_dispose_unknown_id_is_404() {
    let h = harness();
    let err = dispose_workspace(
        State(h.state.clone()),
        Path("ghost".to_string()),
        HeaderMap::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dispose_all_clears_every_session() {
    let h = harness();
    spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(spawn_body()))
        .await
        .unwrap();

    let Json(value) = dispose_all_workspaces(State(h.state.clone()), HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(value["status"], "ok");
    assert!(h.state.manager.list_sessions().is_empty());
}

#[test]
fn client_registry_counts_viewers() {
    let registry = crate::ClientRegistry::default();
    assert_eq!(registry.viewers("s1"), 0);

    registry.register("s1");
    registry.register("s1");
    assert_eq!(registry.viewers("s1"), 2);

    registry.unregister("s1");
    assert_eq!(registry.viewers("s1"), 1);
    registry.unregister("s1");
    assert_eq!(registry.viewers("s1"), 0);

    // Unregistering an unknown session is a no-op.
    registry.unregister("ghost");
}

#[tokio::test]
async fn dispose_unknown_session_is_404() {
    let h = harness();
    let err = dispose_session(
        State(h.state.clone()),
        Path("ghost".to_string()),
        HeaderMap::new(),
    )
    .await
    .unwrap_err();
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rename_conflict_maps_to_409() {
    let h = harness();
    let mut body = spawn_body();
    body.nickname = "feat".to_string();
    let Json(_first) = spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(body))
        .await
        .unwrap();

    let mut body = spawn_body();
    body.nickname = "other".to_string();
    let Json(second) = spawn_sessions(State(h.state.clone()), HeaderMap::new(), Json(body))
        .await
        .unwrap();

    let err = rename_session(
        State(h.state.clone()),
        Path(second[0].session_id.clone()),
        HeaderMap::new(),
        Json(RenameBody {
            nickname: "feat".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_returns_all_sessions() {
    let h = harness();
    spawn_sessions(
        State(h.state.clone()),
        HeaderMap::new(),
        Json(spawn_body()),
    )
    .await
    .unwrap();

    let Json(sessions) = list_sessions(State(h.state.clone()), HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
}

mod auth {
    use super::*;

    fn authed_harness() -> Harness {
        harness_with_config(|c| c.auth_token = Some("sekrit".to_string()))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn missing_token_is_401() {
        let h = authed_harness();
        let err = list_sessions(State(h.state.clone()), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_is_401() {
        let h = authed_harness();
        let err = list_sessions(State(h.state.clone()), bearer("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_passes() {
        let h = authed_harness();
        assert!(list_sessions(State(h.state.clone()), bearer("sekrit"))
            .await
            .is_ok());
    }
}

#[test]
fn spawn_result_serializes_wire_fields() {
    let result = SpawnResult {
        session_id: "s".to_string(),
        workspace_id: "w".to_string(),
        target: "claude".to_string(),
        command: "claude 'hi'".to_string(),
        prompt: "hi".to_string(),
        nickname: "n".to_string(),
        error: None,
    };
    let v = serde_json::to_value(&result).unwrap();
    for field in ["session_id", "workspace_id", "target", "command", "prompt", "nickname"] {
        assert!(v.get(field).is_some());
    }
    assert!(v.get("error").is_none());
}
