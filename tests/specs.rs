// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level behavior tests across the engine, storage and adapter
//! crates, driven through the fake multiplexer and process control.

use std::sync::Arc;
use std::time::Duration;
use sx_adapters::{FakeMux, FakeProcesses};
use sx_core::{Config, Session, Signal, SignalState};
use sx_engine::{
    apply_signal, EngineError, SessionManager, SpawnRequest, Tracker, TrackerHooks,
    WorkspaceSelector,
};
use sx_storage::StateStore;

struct Harness {
    manager: Arc<SessionManager<FakeMux, FakeProcesses>>,
    mux: FakeMux,
    procs: FakeProcesses,
    store: Arc<StateStore>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let mut config = Config::fresh();
    config.command_timeout_ms = 200;
    let mux = FakeMux::new();
    let procs = FakeProcesses::new();
    let manager = SessionManager::new(
        Arc::clone(&store),
        mux.clone(),
        procs.clone(),
        config,
        dir.path().join("workspaces"),
    )
    .with_detected_tools(vec!["claude".to_string()])
    .with_attach_fn(Arc::new(|_, _| Err(sx_adapters::PtyError::NotAttached)));
    Harness {
        manager: Arc::new(manager),
        mux,
        procs,
        store,
        _dir: dir,
    }
}

fn request(nickname: Option<&str>) -> SpawnRequest {
    SpawnRequest {
        workspace: WorkspaceSelector::RepoBranch {
            repo: "example/app".to_string(),
            branch: "main".to_string(),
            new_branch: None,
        },
        target: "claude".to_string(),
        prompt: "hi".to_string(),
        nickname: nickname.map(String::from),
        resume: false,
        command: None,
    }
}

// ── Nickname uniqueness ─────────────────────────────────────────────

#[tokio::test]
async fn spawning_same_base_nickname_yields_numbered_sequence() {
    let h = harness();
    let mut nicknames = Vec::new();
    for _ in 0..4 {
        let outcome = h.manager.spawn(request(Some("base"))).await.unwrap();
        nicknames.push(outcome.session.nickname.unwrap());
    }
    assert_eq!(nicknames, vec!["base", "base (1)", "base (2)", "base (3)"]);

    // Sanitized window names are pairwise distinct.
    let windows: std::collections::HashSet<String> = h
        .manager
        .list_sessions()
        .into_iter()
        .map(|s| s.tmux_session)
        .collect();
    assert_eq!(windows.len(), 4);
}

// ── Spawn and prompt validation ─────────────────────────────────────

#[tokio::test]
async fn spawn_and_echo_local() {
    let h = harness();
    let outcome = h.manager.spawn(request(None)).await.unwrap();
    let session = outcome.session;

    assert_eq!(session.status, sx_core::SessionStatus::Running);
    assert!(h.mux.window(&session.tmux_session).unwrap().alive);
    assert!(h.manager.tracker(session.id.as_str()).is_some());

    // Input falls through to the multiplexer while no PTY is attached.
    std::env::set_var("SCHMUX_INPUT_PTY_WAIT_MS", "20");
    h.manager
        .send_input(session.id.as_str(), b"x")
        .await
        .unwrap();
    std::env::remove_var("SCHMUX_INPUT_PTY_WAIT_MS");
    assert_eq!(h.mux.sent_keys(&session.tmux_session), vec!["x"]);
}

#[tokio::test]
async fn promptable_target_requires_prompt() {
    let h = harness();
    let mut req = request(None);
    req.prompt = String::new();

    let err = h.manager.spawn(req).await.unwrap_err();
    assert_eq!(err.to_string(), "prompt is required for target claude");
}

// ── Rename conflicts ────────────────────────────────────────────────

#[tokio::test]
async fn rename_conflict_carries_existing_session_id() {
    let h = harness();
    let a = h.manager.spawn(request(Some("feat"))).await.unwrap();
    let b = h.manager.spawn(request(Some("feat.x"))).await.unwrap();
    assert_eq!(b.session.tmux_session, "feat-x");

    let err = h
        .manager
        .rename(b.session.id.as_str(), "feat")
        .await
        .unwrap_err();
    match err {
        EngineError::Conflict { existing, .. } => {
            assert_eq!(existing, a.session.id.to_string());
        }
        other => panic!("expected conflict, got: {other}"),
    }
}

// ── Dispose with orphan processes ───────────────────────────────────

#[tokio::test]
async fn dispose_kills_tracked_pid_and_workspace_orphan() {
    let h = harness();
    let outcome = h.manager.spawn(request(None)).await.unwrap();
    let session = outcome.session;
    let workspace = h.store.get_workspace(&session.workspace_id).unwrap();

    h.procs.add_live(session.pid);
    h.procs.add_orphan(workspace.path.clone(), 4242);

    h.manager.dispose(session.id.as_str()).await.unwrap();

    let killed = h.procs.terminated_pids();
    assert!(killed.contains(&session.pid));
    assert!(killed.contains(&4242));
    assert!(!h.mux.window(&session.tmux_session).unwrap().alive);
    assert!(h.store.get_session(session.id.as_str()).is_none());
}

// ── Nudge sequence monotonicity ─────────────────────────────────────

#[tokio::test]
async fn nudge_seq_strictly_increases_on_non_working_signals() {
    let h = harness();
    let outcome = h.manager.spawn(request(None)).await.unwrap();
    let id = outcome.session.id.to_string();

    let states = [
        SignalState::NeedsInput,
        SignalState::Working,
        SignalState::Completed,
        SignalState::Error,
        SignalState::Working,
        SignalState::NeedsInput,
    ];
    let mut seqs = Vec::new();
    for state in states {
        apply_signal(&h.store, &id, &Signal::now(state, "m")).unwrap();
        seqs.push(h.store.get_session(&id).unwrap().nudge_seq);
    }
    assert_eq!(seqs, vec![1, 1, 2, 3, 3, 4]);

    // Working leaves the payload cleared, non-working sets it.
    assert!(h.store.get_session(&id).unwrap().nudge.is_some());
    apply_signal(&h.store, &id, &Signal::now(SignalState::Working, "")).unwrap();
    assert!(h.store.get_session(&id).unwrap().nudge.is_none());
}

// ── Client channel handover ─────────────────────────────────────────

#[tokio::test]
async fn latest_viewer_wins_handover() {
    let h = harness();
    let outcome = h.manager.spawn(request(None)).await.unwrap();
    let tracker = h.manager.tracker(outcome.session.id.as_str()).unwrap();

    let (_t1, mut rx1) = tracker.attach_web_socket();
    tracker.ingest(b"before");
    assert_eq!(rx1.recv().await.unwrap(), b"before");

    let (_t2, mut rx2) = tracker.attach_web_socket();
    tracker.ingest(b"after");

    assert!(rx1.recv().await.is_none(), "old channel must close");
    assert_eq!(rx2.recv().await.unwrap(), b"after");
}

// ── Signal recovery on restart ──────────────────────────────────────

#[tokio::test]
async fn restart_recovers_signal_state_from_disk_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".schmux")).unwrap();
    std::fs::write(
        dir.path().join(".schmux/signal"),
        r#"{"state":"needs_input","summary":"approve"}"#,
    )
    .unwrap();

    let seen: Arc<parking_lot::Mutex<Vec<Signal>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let hooks = TrackerHooks {
        on_activity: Arc::new(|_| {}),
        on_signal: Arc::new(move |_, sig| sink.lock().push(sig)),
        on_bytes: None,
    };

    // Stored nudge says working; the disk disagrees.
    let session = Session::test_local("s1", "ws1");
    let tracker = Tracker::start(
        &session,
        Some(dir.path()),
        FakeMux::new(),
        Arc::new(|_, _| Err(sx_adapters::PtyError::NotAttached)),
        hooks,
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1, "exactly one recovery callback");
        assert_eq!(seen[0].state, SignalState::NeedsInput);
        assert_eq!(seen[0].message, "approve");
    }

    tracker.stop().await;
}

// ── Remote spawn queue ordering ─────────────────────────────────────

#[tokio::test]
async fn queued_remote_spawns_resolve_in_order() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let flavor = sx_core::Flavor::test_ssh("devbox");
    let host = sx_core::Host {
        id: sx_core::HostId::new("h1"),
        flavor_id: "devbox".to_string(),
        hostname: "dev-1".to_string(),
        uuid: "u".to_string(),
        connected_at: None,
        expires_at: None,
        status: sx_core::HostStatus::Connecting,
        provisioned: true,
    };
    let conn = sx_adapters::RemoteConnection::detached(flavor, host, Duration::from_secs(1));

    let rx1 = conn.queue_session("s1", "w1", "/ws", "c1");
    let rx2 = conn.queue_session("s2", "w2", "/ws", "c2");
    let rx3 = conn.queue_session("s3", "w3", "/ws", "c3");

    let (stdin_near, stdin_far) = tokio::io::duplex(64 * 1024);
    let (stdout_near, stdout_far) = tokio::io::duplex(64 * 1024);
    conn.attach_streams(stdin_near, stdout_far).await;

    let server = tokio::spawn(async move {
        let mut commands = BufReader::new(stdin_far);
        let mut frames = stdout_near;
        for n in 1..=3u32 {
            let mut line = String::new();
            commands.read_line(&mut line).await.unwrap();
            assert!(line.starts_with("new-window"), "got: {line}");
            let reply = format!("%begin 1 1 1\n@{n} %{n}\n%end 1 1 1\n");
            frames.write_all(reply.as_bytes()).await.unwrap();
        }
        frames
    });

    conn.mark_connected().await;
    let _frames = server.await.unwrap();

    assert_eq!(rx1.await.unwrap().unwrap(), ("@1".into(), "%1".into()));
    assert_eq!(rx2.await.unwrap().unwrap(), ("@2".into(), "%2".into()));
    assert_eq!(rx3.await.unwrap().unwrap(), ("@3".into(), "%3".into()));
}

// ── UTF-8 boundary preservation ─────────────────────────────────────

#[tokio::test]
async fn utf8_partitions_reassemble_exactly() {
    let stream = "plain ● mixed 🔒 naïve ü text".as_bytes();

    // Every possible split point of the stream, carried through the
    // boundary function the tracker's read loop uses.
    for cut in 0..=stream.len() {
        let mut pending: Vec<u8> = Vec::new();
        let mut released: Vec<u8> = Vec::new();
        for part in [&stream[..cut], &stream[cut..]] {
            let mut chunk = std::mem::take(&mut pending);
            chunk.extend_from_slice(part);
            let complete = sx_engine::complete_prefix_len(&chunk);
            pending = chunk.split_off(complete);
            assert!(std::str::from_utf8(&chunk).is_ok());
            released.extend_from_slice(&chunk);
        }
        released.extend_from_slice(&pending);
        assert_eq!(released, stream, "cut at {cut}");
    }
}

// ── Terminal query response filtering ───────────────────────────────

#[test]
fn terminal_query_responses_are_recognized() {
    for prefix in ["\x1b[?1;2c", "\x1b[>0;1;0c", "\x1b]10;rgb:ff/ff/ff\x07", "\x1b]11;x"] {
        assert!(sx_adapters::detect::is_terminal_query_response(
            prefix.as_bytes()
        ));
    }
    assert!(!sx_adapters::detect::is_terminal_query_response(b"ls\r"));
}

// ── Persistence across restarts ─────────────────────────────────────

#[tokio::test]
async fn state_survives_store_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let store = Arc::new(StateStore::load(&path).unwrap());
        let manager = SessionManager::new(
            Arc::clone(&store),
            FakeMux::new(),
            FakeProcesses::new(),
            Config::fresh(),
            dir.path().join("workspaces"),
        )
        .with_detected_tools(vec!["claude".to_string()])
        .with_attach_fn(Arc::new(|_, _| Err(sx_adapters::PtyError::NotAttached)));
        let outcome = manager.spawn(request(Some("persisted"))).await.unwrap();
        apply_signal(
            &store,
            outcome.session.id.as_str(),
            &Signal::now(SignalState::Completed, "done"),
        )
        .unwrap();
    }

    let reloaded = StateStore::load(&path).unwrap();
    let sessions = reloaded.get_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].nickname.as_deref(), Some("persisted"));
    assert_eq!(sessions[0].nudge_seq, 1);
    assert_eq!(
        sessions[0].nudge.as_ref().unwrap()["state"],
        "Completed"
    );
}
