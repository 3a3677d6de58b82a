// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: owns the session set and the per-session supervisors.
//!
//! Generic over the multiplexer and process-control adapters so the
//! lifecycle logic runs against fakes in tests.

use crate::error::EngineError;
use crate::monitor::{MonitorHooks, RemoteMonitor};
use crate::signals::{apply_signal, stored_nudge_label};
use crate::tracker::{pty_attach_fn, AttachFn, Tracker, TrackerHooks};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use sx_adapters::remote::RemoteConnection;
use sx_adapters::{MuxAdapter, ProcessControl};
use sx_core::{sanitize_window_name, Config, Session, SessionId, Signal};
use sx_storage::StateStore;

pub use crate::dispose::DisposeReport;
pub use crate::workspaces::WorkspaceSelector;

/// Optional raw byte tap shared by all trackers (preview autodetection).
pub type ByteTap = Arc<dyn Fn(&SessionId, &[u8]) + Send + Sync>;

pub struct SessionManager<M: MuxAdapter, P: ProcessControl> {
    pub(crate) store: Arc<StateStore>,
    pub(crate) mux: M,
    pub(crate) procs: P,
    pub(crate) config: Config,
    pub(crate) detected_tools: Vec<String>,
    pub(crate) workspaces_root: PathBuf,
    pub(crate) trackers: Mutex<HashMap<String, Arc<Tracker<M>>>>,
    pub(crate) monitors: Arc<Mutex<HashMap<String, RemoteMonitor>>>,
    pub(crate) remotes: tokio::sync::Mutex<HashMap<String, RemoteConnection>>,
    pub(crate) byte_tap: Option<ByteTap>,
    pub(crate) attach: AttachFn,
}

impl<M: MuxAdapter, P: ProcessControl> SessionManager<M, P> {
    pub fn new(
        store: Arc<StateStore>,
        mux: M,
        procs: P,
        config: Config,
        workspaces_root: PathBuf,
    ) -> Self {
        let detected_tools = crate::targets::detect_tools();
        Self {
            store,
            mux,
            procs,
            config,
            detected_tools,
            workspaces_root,
            trackers: Mutex::new(HashMap::new()),
            monitors: Arc::new(Mutex::new(HashMap::new())),
            remotes: tokio::sync::Mutex::new(HashMap::new()),
            byte_tap: None,
            attach: pty_attach_fn(),
        }
    }

    /// Override the detected-tools list (tests, or config pinning).
    pub fn with_detected_tools(mut self, tools: Vec<String>) -> Self {
        self.detected_tools = tools;
        self
    }

    /// Install the raw byte tap handed to every tracker.
    pub fn with_byte_tap(mut self, tap: ByteTap) -> Self {
        self.byte_tap = Some(tap);
        self
    }

    /// Override how trackers open their PTY attachment (tests).
    pub fn with_attach_fn(mut self, attach: AttachFn) -> Self {
        self.attach = attach;
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mux(&self) -> &M {
        &self.mux
    }

    // ── session queries ─────────────────────────────────────────────

    pub fn list_sessions(&self) -> Vec<Session> {
        self.store.get_sessions()
    }

    pub fn get_session(&self, id: &str) -> Result<Session, EngineError> {
        self.store
            .get_session(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    /// True when the session exists and is in running state.
    pub fn is_running(&self, id: &str) -> bool {
        self.store
            .get_session(id)
            .map(|s| s.status == sx_core::SessionStatus::Running)
            .unwrap_or(false)
    }

    // ── rename ──────────────────────────────────────────────────────

    /// Rename a local session's nickname (and multiplexer window).
    ///
    /// Fails with a conflict when the sanitized window name collides with
    /// any other session's window.
    pub async fn rename(&self, id: &str, new_nickname: &str) -> Result<Session, EngineError> {
        let mut session = self.get_session(id)?;
        if session.is_remote() {
            return Err(EngineError::Validation(
                "remote sessions cannot be renamed".to_string(),
            ));
        }

        let new_window = sanitize_window_name(new_nickname);
        if new_window.is_empty() {
            return Err(EngineError::Validation("nickname must not be empty".to_string()));
        }
        if let Some(existing) = self
            .list_sessions()
            .into_iter()
            .find(|s| s.id.as_str() != id && s.tmux_session == new_window)
        {
            return Err(EngineError::Conflict {
                name: new_window,
                existing: existing.id.to_string(),
            });
        }

        self.mux.rename(&session.tmux_session, &new_window).await?;

        session.nickname = Some(new_nickname.to_string());
        session.tmux_session = new_window.clone();
        self.store.update_session(session.clone())?;
        self.store.save()?;

        if let Some(tracker) = self.tracker(id) {
            tracker.set_window(&new_window);
        }
        tracing::info!(session_id = id, window = %new_window, "session renamed");
        Ok(session)
    }

    // ── input ───────────────────────────────────────────────────────

    /// Deliver input to a session's terminal, local or remote.
    pub async fn send_input(&self, id: &str, data: &[u8]) -> Result<(), EngineError> {
        let session = self.get_session(id)?;
        if session.is_remote() {
            let conn = self
                .connection_for_host(&session.remote_host_id)
                .await
                .ok_or(sx_adapters::RemoteError::NotConnected)?;
            conn.send_keys(&session.remote_pane_id, &String::from_utf8_lossy(data))
                .await?;
            return Ok(());
        }
        let tracker = self
            .tracker(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        tracker.send_input(data).await
    }

    // ── tracker registry ────────────────────────────────────────────

    pub fn tracker(&self, id: &str) -> Option<Arc<Tracker<M>>> {
        self.trackers.lock().get(id).cloned()
    }

    /// Idempotent: returns the existing tracker (after pointing it at the
    /// session's current window) or starts a fresh one.
    pub fn ensure_tracker_from_session(&self, session: &Session) -> Arc<Tracker<M>> {
        if let Some(existing) = self.tracker(session.id.as_str()) {
            existing.set_window(&session.tmux_session);
            return existing;
        }
        let workspace_path = self
            .store
            .get_workspace(&session.workspace_id)
            .filter(|w| !w.is_remote())
            .map(|w| w.path);
        let tracker = Tracker::start(
            session,
            workspace_path.as_deref(),
            self.mux.clone(),
            Arc::clone(&self.attach),
            self.tracker_hooks(),
        );
        self.trackers
            .lock()
            .insert(session.id.to_string(), Arc::clone(&tracker));
        tracker
    }

    /// Remove and stop the tracker for a session.
    pub async fn stop_tracker(&self, id: &str) {
        let tracker = self.trackers.lock().remove(id);
        if let Some(tracker) = tracker {
            tracker.stop().await;
        }
    }

    pub(crate) fn tracker_hooks(&self) -> TrackerHooks {
        let activity_store = Arc::clone(&self.store);
        let signal_store = Arc::clone(&self.store);
        TrackerHooks {
            on_activity: Arc::new(move |id: &SessionId| {
                if let Err(e) = activity_store
                    .update_session_last_output(id.as_str(), Utc::now())
                    .and_then(|_| activity_store.save())
                {
                    tracing::warn!(session_id = %id, error = %e, "last-output update failed");
                }
            }),
            on_signal: Arc::new(move |id: &SessionId, sig: Signal| {
                if let Err(e) = apply_signal(&signal_store, id.as_str(), &sig) {
                    tracing::warn!(session_id = %id, error = %e, "signal apply failed");
                }
            }),
            on_bytes: self.byte_tap.clone(),
        }
    }

    // ── remote monitor registry ─────────────────────────────────────

    pub(crate) fn start_remote_monitor(&self, session: &Session, conn: RemoteConnection) {
        let store = Arc::clone(&self.store);
        let label_session = session.id.to_string();
        let signal_store = Arc::clone(&self.store);
        let hooks = MonitorHooks {
            on_signal: Arc::new(move |id: &SessionId, sig: Signal| {
                if let Err(e) = apply_signal(&signal_store, id.as_str(), &sig) {
                    tracing::warn!(session_id = %id, error = %e, "signal apply failed");
                }
            }),
            stored_label: Arc::new(move || {
                store
                    .get_session(&label_session)
                    .as_ref()
                    .and_then(stored_nudge_label)
            }),
        };
        let monitor = RemoteMonitor::start(
            conn,
            session.id.clone(),
            session.remote_pane_id.clone(),
            hooks,
        );
        self.monitors.lock().insert(session.id.to_string(), monitor);
    }

    /// Shared monitor registry, used by background queue listeners.
    pub(crate) fn monitors_registry(
        &self,
    ) -> Arc<Mutex<HashMap<String, RemoteMonitor>>> {
        Arc::clone(&self.monitors)
    }

    /// Close the monitor's stop channel and wait for it to exit.
    pub async fn stop_remote_monitor(&self, id: &str) {
        let monitor = self.monitors.lock().remove(id);
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
    }

    // ── remote connection pool ──────────────────────────────────────

    /// The connection serving a given host id, if any.
    pub async fn connection_for_host(&self, host_id: &str) -> Option<RemoteConnection> {
        let remotes = self.remotes.lock().await;
        for conn in remotes.values() {
            if conn.host().id.as_str() == host_id {
                return Some(conn.clone());
            }
        }
        None
    }

    /// Restore supervisors after a daemon restart: trackers for local
    /// running sessions, nothing for remote ones until their connection
    /// is re-established.
    pub fn resume_sessions(&self) {
        for session in self.list_sessions() {
            if !session.is_remote() && session.status == sx_core::SessionStatus::Running {
                self.ensure_tracker_from_session(&session);
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
