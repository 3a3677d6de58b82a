// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State store with explicit persistence.
//!
//! The store owns the canonical session/workspace/host records. Getters
//! return clones (value-copy semantics: callers must not assume a returned
//! record tracks later mutations). `save()` persists the whole state with
//! an atomic temp-file + rename so a crash never leaves a torn file; the
//! core calls it after each meaningful mutation.

use crate::state::StateData;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use sx_core::{Host, Session, Workspace};
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// In-memory state with JSON file persistence.
pub struct StateStore {
    path: PathBuf,
    data: Mutex<StateData>,
}

impl StateStore {
    /// Load state from `path`; a missing file yields fresh state.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateData::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Persist the full state atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        let json = {
            let data = self.data.lock();
            serde_json::to_vec_pretty(&*data)?
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    // ── sessions ────────────────────────────────────────────────────

    pub fn add_session(&self, session: Session) {
        self.data
            .lock()
            .sessions
            .insert(session.id.to_string(), session);
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.data.lock().sessions.get(id).cloned()
    }

    /// Replace a session record wholesale.
    pub fn update_session(&self, session: Session) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        let id = session.id.to_string();
        if !data.sessions.contains_key(&id) {
            return Err(StoreError::SessionNotFound(id));
        }
        data.sessions.insert(id, session);
        Ok(())
    }

    pub fn remove_session(&self, id: &str) -> Option<Session> {
        self.data.lock().sessions.remove(id)
    }

    pub fn get_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.data.lock().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    pub fn update_session_last_output(
        &self,
        id: &str,
        t: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_session(id, |s| s.last_output_at = Some(t))
    }

    pub fn update_session_last_signal(
        &self,
        id: &str,
        t: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_session(id, |s| s.last_signal_at = Some(t))
    }

    /// Set or clear the nudge payload.
    pub fn update_session_nudge(
        &self,
        id: &str,
        nudge: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.with_session(id, |s| s.nudge = nudge)
    }

    /// Bump the monotonic nudge sequence; returns the new value.
    pub fn increment_nudge_seq(&self, id: &str) -> Result<u64, StoreError> {
        let mut data = self.data.lock();
        let session = data
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        session.nudge_seq += 1;
        Ok(session.nudge_seq)
    }

    fn with_session(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session),
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        let session = data
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        f(session);
        Ok(())
    }

    // ── workspaces ──────────────────────────────────────────────────

    pub fn add_workspace(&self, workspace: Workspace) {
        self.data
            .lock()
            .workspaces
            .insert(workspace.id.to_string(), workspace);
    }

    pub fn get_workspace(&self, id: &str) -> Option<Workspace> {
        self.data.lock().workspaces.get(id).cloned()
    }

    pub fn update_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        let id = workspace.id.to_string();
        if !data.workspaces.contains_key(&id) {
            return Err(StoreError::WorkspaceNotFound(id));
        }
        data.workspaces.insert(id, workspace);
        Ok(())
    }

    pub fn get_workspaces(&self) -> Vec<Workspace> {
        let mut workspaces: Vec<Workspace> =
            self.data.lock().workspaces.values().cloned().collect();
        workspaces.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        workspaces
    }

    // ── hosts ───────────────────────────────────────────────────────

    pub fn upsert_host(&self, host: Host) {
        self.data.lock().hosts.insert(host.id.to_string(), host);
    }

    pub fn get_host(&self, id: &str) -> Option<Host> {
        self.data.lock().hosts.get(id).cloned()
    }

    pub fn get_hosts(&self) -> Vec<Host> {
        self.data.lock().hosts.values().cloned().collect()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
