// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

/// Random prefix for this test run to avoid conflicts with parallel test runs.
static TEST_PREFIX: LazyLock<String> = LazyLock::new(|| {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    format!("t{:04x}", nanos & 0xFFFF)
});

/// Counter for generating unique window names across parallel tests.
static WINDOW_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(suffix: &str) -> String {
    let id = WINDOW_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", *TEST_PREFIX, suffix, id)
}

fn adapter() -> TmuxMux {
    TmuxMux::new(Duration::from_secs(5))
}

const SIZE: WindowSize = WindowSize { cols: 80, rows: 24 };

/// Check if tmux is available on this system
fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! fail_if_no_tmux {
    () => {
        if !tmux_available() {
            panic!("tmux is required but not available");
        }
    };
}

#[test]
fn parse_size_accepts_width_height() {
    assert_eq!(
        parse_size("220 50"),
        Some(WindowSize { cols: 220, rows: 50 })
    );
}

#[test]
fn parse_size_rejects_garbage() {
    assert_eq!(parse_size(""), None);
    assert_eq!(parse_size("220"), None);
    assert_eq!(parse_size("wide tall"), None);
}

#[tokio::test]
#[serial(tmux)]
async fn create_returns_pane_pid() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("create");

    let pid = mux
        .create(&name, Path::new("/tmp"), "sleep 60", SIZE)
        .await
        .unwrap();
    assert!(pid > 0);

    // Cleanup
    let _ = mux.kill(&name).await;
}

#[tokio::test]
#[serial(tmux)]
async fn create_rejects_nonexistent_cwd() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("badcwd");

    let result = mux
        .create(&name, Path::new("/nonexistent/path"), "sleep 1", SIZE)
        .await;

    assert!(matches!(result, Err(MuxError::SpawnFailed(_))));
}

#[tokio::test]
#[serial(tmux)]
async fn exists_tracks_window_lifecycle() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("exists");

    mux.create(&name, Path::new("/tmp"), "sleep 60", SIZE)
        .await
        .unwrap();
    assert!(mux.exists(&name).await.unwrap());

    mux.kill(&name).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!mux.exists(&name).await.unwrap());
}

#[tokio::test]
#[serial(tmux)]
async fn kill_nonexistent_window_succeeds() {
    fail_if_no_tmux!();
    let mux = adapter();
    assert!(mux.kill("nonexistent-window-xyz").await.is_ok());
}

#[tokio::test]
#[serial(tmux)]
async fn send_keys_are_echoed() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("send");

    mux.create(&name, Path::new("/tmp"), "cat", SIZE)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    mux.send_keys(&name, "hello\r").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let output = mux.capture_lines(&name, 10).await.unwrap();
    assert!(output.contains("hello"));

    let _ = mux.kill(&name).await;
}

#[tokio::test]
#[serial(tmux)]
async fn send_keys_to_nonexistent_window_is_not_found() {
    fail_if_no_tmux!();
    let mux = adapter();
    let result = mux.send_keys("nonexistent-window-xyz", "x").await;
    assert!(matches!(result, Err(MuxError::NotFound(_))));
}

#[tokio::test]
#[serial(tmux)]
async fn window_size_matches_creation_size() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("size");

    mux.create(&name, Path::new("/tmp"), "sleep 60", SIZE)
        .await
        .unwrap();

    let size = mux.window_size(&name).await.unwrap();
    assert_eq!(size, SIZE);

    let _ = mux.kill(&name).await;
}

#[tokio::test]
#[serial(tmux)]
async fn resize_window_changes_size() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("resize");

    mux.create(&name, Path::new("/tmp"), "sleep 60", SIZE)
        .await
        .unwrap();

    let new_size = WindowSize { cols: 100, rows: 30 };
    mux.resize_window(&name, new_size).await.unwrap();

    let size = mux.window_size(&name).await.unwrap();
    assert_eq!(size, new_size);

    let _ = mux.kill(&name).await;
}

#[tokio::test]
#[serial(tmux)]
async fn rename_moves_the_window() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("rename");
    let renamed = unique_name("renamed");

    mux.create(&name, Path::new("/tmp"), "sleep 60", SIZE)
        .await
        .unwrap();
    mux.rename(&name, &renamed).await.unwrap();

    assert!(!mux.exists(&name).await.unwrap());
    assert!(mux.exists(&renamed).await.unwrap());

    let _ = mux.kill(&renamed).await;
}

#[tokio::test]
#[serial(tmux)]
async fn capture_lines_returns_scrollback() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("capture");

    mux.create(
        &name,
        Path::new("/tmp"),
        "echo capture-probe-output && sleep 60",
        SIZE,
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let output = mux.capture_lines(&name, 10).await.unwrap();
    assert!(output.contains("capture-probe-output"));

    let _ = mux.kill(&name).await;
}

#[tokio::test]
#[serial(tmux)]
async fn set_status_is_non_fatal() {
    fail_if_no_tmux!();
    let mux = adapter();
    let name = unique_name("status");

    mux.create(&name, Path::new("/tmp"), "sleep 60", SIZE)
        .await
        .unwrap();
    // Styling an existing window succeeds; the call never hard-fails.
    mux.set_status(&name, "claude", "%H:%M").await.unwrap();

    let _ = mux.kill(&name).await;
}
