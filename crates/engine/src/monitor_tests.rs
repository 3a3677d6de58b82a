// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use sx_core::{Flavor, Host, HostId, HostStatus, SignalState};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

struct Script {
    conn: RemoteConnection,
    commands: BufReader<tokio::io::DuplexStream>,
    frames: tokio::io::DuplexStream,
}

async fn scripted_connection() -> Script {
    let host = Host {
        id: HostId::new("h1"),
        flavor_id: "devbox".to_string(),
        hostname: "dev-1".to_string(),
        uuid: "u".to_string(),
        connected_at: None,
        expires_at: None,
        status: HostStatus::Connecting,
        provisioned: true,
    };
    let conn = RemoteConnection::detached(
        Flavor::test_ssh("devbox"),
        host,
        Duration::from_secs(1),
    );
    let (stdin_near, stdin_far) = tokio::io::duplex(64 * 1024);
    let (stdout_near, stdout_far) = tokio::io::duplex(64 * 1024);
    conn.attach_streams(stdin_near, stdout_far).await;
    conn.mark_connected().await;

    Script {
        conn,
        commands: BufReader::new(stdin_far),
        frames: stdout_near,
    }
}

impl Script {
    async fn expect_command(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(2), self.commands.read_line(&mut line))
            .await
            .expect("timed out waiting for command")
            .expect("command channel closed");
        line.trim_end().to_string()
    }

    async fn reply_ok(&mut self, body: &str) {
        let mut frame = String::from("%begin 1 1 1\n");
        if !body.is_empty() {
            frame.push_str(body);
            frame.push('\n');
        }
        frame.push_str("%end 1 1 1\n");
        self.frames.write_all(frame.as_bytes()).await.unwrap();
    }

    async fn output(&mut self, pane: &str, payload: &str) {
        let frame = format!("%output {pane} {payload}\n");
        self.frames.write_all(frame.as_bytes()).await.unwrap();
    }
}

fn collecting_hooks(
    stored: Option<&str>,
) -> (MonitorHooks, Arc<Mutex<Vec<Signal>>>) {
    let seen: Arc<Mutex<Vec<Signal>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let stored: Option<String> = stored.map(|s| s.to_string());
    let hooks = MonitorHooks {
        on_signal: Arc::new(move |_, sig| sink.lock().push(sig)),
        stored_label: Arc::new(move || stored.clone()),
    };
    (hooks, seen)
}

async fn wait_for_count(seen: &Arc<Mutex<Vec<Signal>>>, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if seen.lock().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {n} signals, got {}", seen.lock().len());
}

#[tokio::test]
async fn recovery_emits_when_scrollback_disagrees_with_stored_nudge() {
    let mut script = scripted_connection().await;
    let (hooks, seen) = collecting_hooks(None);

    let monitor = RemoteMonitor::start(
        script.conn.clone(),
        SessionId::new("s1"),
        "%5".to_string(),
        hooks,
    );

    let cmd = script.expect_command().await;
    assert!(cmd.starts_with("capture-pane -t %5"), "got: {cmd}");
    script
        .reply_ok("$ claude\n[schmux:needs_input] approve the plan")
        .await;

    wait_for_count(&seen, 1).await;
    {
        let seen = seen.lock();
        assert_eq!(seen[0].state, SignalState::NeedsInput);
        assert_eq!(seen[0].message, "approve the plan");
    }

    monitor.stop().await;
}

#[tokio::test]
async fn recovery_is_silent_when_stored_nudge_matches() {
    let mut script = scripted_connection().await;
    let (hooks, seen) = collecting_hooks(Some("Needs Authorization"));

    let monitor = RemoteMonitor::start(
        script.conn.clone(),
        SessionId::new("s1"),
        "%5".to_string(),
        hooks,
    );

    script.expect_command().await;
    script.reply_ok("[schmux:needs_input] approve").await;

    // Give the monitor time to process recovery, then confirm silence.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(seen.lock().is_empty());

    monitor.stop().await;
}

#[tokio::test]
async fn live_output_flows_through_detector() {
    let mut script = scripted_connection().await;
    let (hooks, seen) = collecting_hooks(None);

    let monitor = RemoteMonitor::start(
        script.conn.clone(),
        SessionId::new("s1"),
        "%5".to_string(),
        hooks,
    );

    script.expect_command().await;
    script.reply_ok("").await; // empty scrollback

    // Wait for the subscription to land before emitting output.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
        script.output("%5", "[schmux:completed] shipped\\012").await;
        if !seen.lock().is_empty() {
            break;
        }
    }

    wait_for_count(&seen, 1).await;
    assert_eq!(seen.lock()[0].state, SignalState::Completed);

    monitor.stop().await;
}

#[tokio::test]
async fn output_for_other_panes_is_ignored() {
    let mut script = scripted_connection().await;
    let (hooks, seen) = collecting_hooks(None);

    let monitor = RemoteMonitor::start(
        script.conn.clone(),
        SessionId::new("s1"),
        "%5".to_string(),
        hooks,
    );

    script.expect_command().await;
    script.reply_ok("").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    script.output("%9", "[schmux:error] not ours\\012").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen.lock().is_empty());

    monitor.stop().await;
}

#[tokio::test]
async fn stop_terminates_promptly() {
    let script = scripted_connection().await;
    let (hooks, _seen) = collecting_hooks(None);

    let monitor = RemoteMonitor::start(
        script.conn.clone(),
        SessionId::new("s1"),
        "%5".to_string(),
        hooks,
    );

    tokio::time::timeout(Duration::from_secs(2), monitor.stop())
        .await
        .expect("stop timed out");
}
