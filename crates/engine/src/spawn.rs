// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session spawning, local and remote.

use crate::error::EngineError;
use crate::manager::SessionManager;
use crate::nickname::unique_nickname;
use crate::workspaces::{
    obtain_remote_workspace, obtain_workspace, provision_instructions, WorkspaceSelector,
    SIGNAL_INSTRUCTIONS,
};
use chrono::Utc;
use std::collections::BTreeMap;
use sx_adapters::remote::RemoteConnection;
use sx_adapters::{MuxAdapter, ProcessControl, WindowSize};
use sx_core::{
    build_command, short_uuid, Session, SessionId, SessionStatus, SignalContext, Target,
    Workspace,
};

/// A local spawn request.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub workspace: WorkspaceSelector,
    pub target: String,
    pub prompt: String,
    pub nickname: Option<String>,
    pub resume: bool,
    /// Raw shell command instead of a named target (the HTTP surface
    /// accepts `targets` XOR `command`).
    pub command: Option<String>,
}

/// What a spawn produced: the inserted session record.
#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub session: Session,
    pub command: String,
}

impl<M: MuxAdapter, P: ProcessControl> SessionManager<M, P> {
    /// Spawn a session on the local machine.
    pub async fn spawn(&self, req: SpawnRequest) -> Result<SpawnOutcome, EngineError> {
        let target = match &req.command {
            Some(raw) => Target {
                name: "command".to_string(),
                kind: sx_core::TargetKind::User,
                command: raw.clone(),
                promptable: false,
                env: BTreeMap::new(),
                model: None,
            },
            None => crate::targets::resolve_target(&self.config, &self.detected_tools, &req.target)?,
        };
        if !req.resume {
            target.check_prompt(&req.prompt)?;
        }

        let workspace = obtain_workspace(&self.store, &self.workspaces_root, &req.workspace)?;
        let instructions = provision_instructions(&workspace.path)?;

        let session_id = SessionId::new(format!("{}-{}", workspace.id, short_uuid()));
        let env = self.agent_env(&target, &session_id, &workspace);

        let signals = SignalContext::local(SIGNAL_INSTRUCTIONS, &instructions);
        let command = build_command(&target, &req.prompt, req.resume, &env, &signals)?;

        let nickname = self.reserve_nickname(req.nickname.as_deref());
        let window = Session::window_name(nickname.as_deref(), &session_id);

        let size = WindowSize {
            cols: self.config.terminal.columns,
            rows: self.config.terminal.rows,
        };
        let pid = self.mux.create(&window, &workspace.path, &command, size).await?;
        // Best-effort styling; the window works without it.
        let _ = self
            .mux
            .set_status(&window, &target.name, "%H:%M %d-%b-%y")
            .await;

        let session = Session {
            id: session_id.clone(),
            workspace_id: workspace.id.to_string(),
            target: target.name.clone(),
            nickname,
            tmux_session: window.clone(),
            created_at: Utc::now(),
            pid,
            remote_host_id: String::new(),
            remote_pane_id: String::new(),
            remote_window: String::new(),
            status: SessionStatus::Running,
            nudge: None,
            nudge_seq: 0,
            last_signal_at: None,
            last_output_at: None,
        };

        self.store.add_session(session.clone());
        if let Err(e) = self.store.save() {
            // Creation succeeded but the record cannot persist: tear the
            // window back down rather than leak it.
            let _ = self.mux.kill(&window).await;
            self.store.remove_session(session_id.as_str());
            return Err(e.into());
        }

        self.ensure_tracker_from_session(&session);
        tracing::info!(
            session_id = %session.id,
            window,
            target = %target.name,
            "session spawned"
        );
        Ok(SpawnOutcome { session, command })
    }

    /// Spawn a session on a remote host. When the control channel is down
    /// the spawn is queued and the session inserted as provisioning; a
    /// listener flips it to running (or failed) when the queue drains.
    pub async fn spawn_remote(
        &self,
        flavor_id: &str,
        target_name: &str,
        prompt: &str,
        nickname: Option<&str>,
    ) -> Result<SpawnOutcome, EngineError> {
        let target =
            crate::targets::resolve_target(&self.config, &self.detected_tools, target_name)?;
        target.check_prompt(prompt)?;

        let conn = self.connect_remote(flavor_id).await?;
        let host = conn.host();
        self.store.upsert_host(host.clone());

        let flavor = conn.flavor().clone();
        let workspace = obtain_remote_workspace(&self.store, &host, &flavor);

        let session_id = SessionId::new(format!("{}-{}", workspace.id, short_uuid()));
        let env = self.agent_env(&target, &session_id, &workspace);

        // Local file paths are meaningless on the remote: inline-capable
        // tools carry the instructions in the command, others skip
        // signaling entirely.
        let signals = SignalContext::remote(SIGNAL_INSTRUCTIONS);
        let command = build_command(&target, prompt, false, &env, &signals)?;

        let nickname = self.reserve_nickname(nickname);
        let window = Session::window_name(nickname.as_deref(), &session_id);
        let cwd = workspace.path.display().to_string();

        let mut session = Session {
            id: session_id.clone(),
            workspace_id: workspace.id.to_string(),
            target: target.name.clone(),
            nickname,
            tmux_session: window.clone(),
            created_at: Utc::now(),
            pid: 0,
            remote_host_id: host.id.to_string(),
            remote_pane_id: String::new(),
            remote_window: String::new(),
            status: SessionStatus::Provisioning,
            nudge: None,
            nudge_seq: 0,
            last_signal_at: None,
            last_output_at: None,
        };

        if conn.is_connected() {
            let (window_id, pane_id) = conn.create_session(&window, &cwd, &command).await?;
            session.remote_window = window_id;
            session.remote_pane_id = pane_id;
            session.status = SessionStatus::Running;
            self.store.add_session(session.clone());
            self.store.save()?;
            self.start_remote_monitor(&session, conn);
        } else {
            self.store.add_session(session.clone());
            self.store.save()?;
            self.listen_for_queued_spawn(&session, &window, &cwd, &command, conn);
        }

        tracing::info!(
            session_id = %session.id,
            window,
            flavor = flavor_id,
            status = %session.status,
            "remote session spawned"
        );
        Ok(SpawnOutcome { session, command })
    }

    /// Queue the spawn and finish the session record when the result
    /// arrives.
    fn listen_for_queued_spawn(
        &self,
        session: &Session,
        window: &str,
        cwd: &str,
        command: &str,
        conn: RemoteConnection,
    ) {
        let result_rx = conn.queue_session(session.id.as_str(), window, cwd, command);
        let store = std::sync::Arc::clone(&self.store);
        let session_id = session.id.to_string();
        let monitor_starter = self.queued_monitor_starter(&conn);
        tokio::spawn(async move {
            let outcome = result_rx.await;
            let mut record = match store.get_session(&session_id) {
                Some(record) => record,
                // Disposed while queued.
                None => return,
            };
            match outcome {
                Ok(Ok((window_id, pane_id))) => {
                    record.remote_window = window_id;
                    record.remote_pane_id = pane_id;
                    record.status = SessionStatus::Running;
                    if store.update_session(record.clone()).is_ok() {
                        let _ = store.save();
                    }
                    monitor_starter(record);
                }
                Ok(Err(e)) => {
                    tracing::warn!(session_id, error = %e, "queued spawn failed");
                    record.status = SessionStatus::Failed;
                    if store.update_session(record).is_ok() {
                        let _ = store.save();
                    }
                }
                Err(_) => {
                    tracing::warn!(session_id, "queued spawn result channel dropped");
                    record.status = SessionStatus::Failed;
                    if store.update_session(record).is_ok() {
                        let _ = store.save();
                    }
                }
            }
        });
    }

    // ── helpers ─────────────────────────────────────────────────────

    /// Signaling environment plus the target's own env (secrets included).
    fn agent_env(
        &self,
        target: &Target,
        session_id: &SessionId,
        workspace: &Workspace,
    ) -> BTreeMap<String, String> {
        let mut env = target.env.clone();
        env.insert(sx_core::ENV_ENABLED.to_string(), "1".to_string());
        env.insert(
            sx_core::ENV_SESSION_ID.to_string(),
            session_id.to_string(),
        );
        env.insert(
            sx_core::ENV_WORKSPACE_ID.to_string(),
            workspace.id.to_string(),
        );
        env
    }

    /// Uniquified nickname against all live sessions.
    ///
    /// Dedup runs on the sanitized window names (`tmux_session`), the same
    /// form the rename path compares, so nicknames that collapse to the
    /// same window name conflict even when the raw strings differ.
    /// Uniqueness reads the session list under the store lock but spawn
    /// and window creation are not covered by one global lock: two racing
    /// spawns with the same base both land in the numeric-suffix search.
    fn reserve_nickname(&self, base: Option<&str>) -> Option<String> {
        let base = base.filter(|b| !b.is_empty())?;
        let taken: Vec<String> = self
            .list_sessions()
            .into_iter()
            .map(|s| s.tmux_session)
            .collect();
        Some(unique_nickname(base, &taken))
    }

    /// Monitor starter callable from the queue-listener task. Monitors
    /// started this way land in the same registry the manager drains on
    /// dispose.
    fn queued_monitor_starter(
        &self,
        conn: &RemoteConnection,
    ) -> Box<dyn FnOnce(Session) + Send> {
        let store = std::sync::Arc::clone(&self.store);
        let conn = conn.clone();
        let hooks_store = std::sync::Arc::clone(&self.store);
        let registry = self.monitors_registry();
        Box::new(move |session: Session| {
            let label_session = session.id.to_string();
            let hooks = crate::monitor::MonitorHooks {
                on_signal: std::sync::Arc::new(move |id: &SessionId, sig| {
                    if let Err(e) = crate::signals::apply_signal(&hooks_store, id.as_str(), &sig) {
                        tracing::warn!(session_id = %id, error = %e, "signal apply failed");
                    }
                }),
                stored_label: std::sync::Arc::new(move || {
                    store
                        .get_session(&label_session)
                        .as_ref()
                        .and_then(crate::signals::stored_nudge_label)
                }),
            };
            let monitor = crate::monitor::RemoteMonitor::start(
                conn,
                session.id.clone(),
                session.remote_pane_id.clone(),
                hooks,
            );
            registry.lock().insert(session.id.to_string(), monitor);
        })
    }

    /// Obtain or establish the control connection for a flavor. A failed
    /// connect leaves a disconnected connection in the pool with a
    /// background task retrying, so queued spawns drain once the host
    /// comes back.
    pub async fn connect_remote(&self, flavor_id: &str) -> Result<RemoteConnection, EngineError> {
        let flavor = self
            .config
            .flavor(flavor_id)
            .cloned()
            .ok_or_else(|| EngineError::FlavorNotFound(flavor_id.to_string()))?;

        let mut remotes = self.remotes.lock().await;
        if let Some(existing) = remotes.get(flavor_id) {
            return Ok(existing.clone());
        }

        let timeout = self.config.command_timeout();
        match RemoteConnection::connect(flavor.clone(), timeout).await {
            Ok(conn) => {
                remotes.insert(flavor_id.to_string(), conn.clone());
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(flavor = flavor_id, error = %e, "remote connect failed, queueing mode");
                let host = sx_core::Host {
                    id: sx_core::HostId::new(format!("{}-{}", flavor.id, short_uuid())),
                    flavor_id: flavor.id.clone(),
                    hostname: String::new(),
                    uuid: uuid::Uuid::new_v4().to_string(),
                    connected_at: None,
                    expires_at: None,
                    status: sx_core::HostStatus::Disconnected,
                    provisioned: false,
                };
                let conn = RemoteConnection::detached(flavor, host, timeout);
                remotes.insert(flavor_id.to_string(), conn.clone());
                spawn_reconnector(conn.clone());
                Ok(conn)
            }
        }
    }
}

/// Keep trying to bring a dead control channel up; exits once connected.
fn spawn_reconnector(conn: RemoteConnection) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            if conn.is_connected() {
                return;
            }
            match conn.reconnect().await {
                Ok(()) => {
                    tracing::info!(flavor = %conn.flavor().id, "control channel established");
                    return;
                }
                Err(e) => {
                    tracing::debug!(flavor = %conn.flavor().id, error = %e, "reconnect attempt failed");
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
