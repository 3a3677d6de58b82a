// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schmux Daemon (schmuxd)
//!
//! Background process that owns agent sessions: spawning into tmux
//! windows, tracking their output, and serving the dashboard's HTTP and
//! WebSocket surface.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use sx_adapters::{TmuxMux, UnixProcesses};
use sx_core::Config;
use sx_daemon::{router, AppState};
use sx_engine::SessionManager;
use sx_storage::StateStore;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("schmuxd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("schmuxd {}", env!("CARGO_PKG_VERSION"));
                println!("Schmux daemon - orchestrates AI agent sessions in tmux");
                println!();
                println!("USAGE:");
                println!("    schmuxd");
                println!();
                println!("Configuration is read from <state_dir>/config.toml; the state");
                println!("directory honors SCHMUX_STATE_DIR, then XDG_STATE_HOME/schmux,");
                println!("then ~/.local/state/schmux.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: schmuxd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let state_dir = sx_daemon::env::state_dir().ok_or("cannot resolve state directory")?;
    std::fs::create_dir_all(&state_dir)?;

    // Single-daemon lock
    let lock_path = state_dir.join("daemon.lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        eprintln!("schmuxd is already running");
        let pid = std::fs::read_to_string(&lock_path).unwrap_or_default();
        if !pid.trim().is_empty() {
            eprintln!("  pid: {}", pid.trim());
        }
        std::process::exit(1);
    }
    std::fs::write(&lock_path, format!("{}\n", std::process::id()))?;

    let config = Config::load(&state_dir.join("config.toml"))?;

    let log_path = state_dir.join("logs/daemon.log");
    rotate_log_if_needed(&log_path);
    let _log_guard = setup_logging(&log_path)?;

    info!("Starting schmuxd");

    let store = Arc::new(StateStore::load(state_dir.join("state.json"))?);
    let mux = TmuxMux::new(config.command_timeout());
    let procs = UnixProcesses::new();
    let listen_addr = config.listen_addr.clone();
    let manager = Arc::new(SessionManager::new(
        Arc::clone(&store),
        mux,
        procs,
        config,
        state_dir.join("workspaces"),
    ));

    // Restart recovery: reattach trackers to surviving local sessions.
    manager.resume_sessions();

    let app = router(AppState::new(Arc::clone(&manager)));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Daemon ready, listening on {listen_addr}");

    // Signal ready for parent process (CLI waiting for startup)
    println!("READY");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("server error: {e}");
    }

    // Trackers hold PTYs and child attaches; stop them before exit.
    for session in manager.list_sessions() {
        manager.stop_tracker(session.id.as_str()).await;
        manager.stop_remote_monitor(session.id.as_str()).await;
    }
    if let Err(e) = store.save() {
        error!("final state save failed: {e}");
    }

    info!("Daemon stopped");
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    // Shift older rotations: .3 is deleted, .2→.3, .1→.2
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    // Rotate current log → .1
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    log_path: &PathBuf,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = log_path.parent().ok_or("log path has no parent")?;
    std::fs::create_dir_all(parent)?;

    let file_appender = tracing_appender::rolling::never(
        parent,
        log_path.file_name().ok_or("log path has no file name")?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
