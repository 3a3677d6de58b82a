// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session disposal.
//!
//! Local disposal kills the tracked process group two-phase, sweeps the
//! workspace for orphans, kills the window, stops the tracker and removes
//! the record. Non-fatal failures accumulate as warnings; removing the
//! record (and persisting) is the authoritative success signal.

use crate::error::EngineError;
use crate::manager::SessionManager;
use sx_adapters::{MuxAdapter, ProcessControl};
use sx_core::Session;

/// Per-call disposal summary.
#[derive(Debug, Clone)]
pub struct DisposeReport {
    pub session_id: String,
    pub warnings: Vec<String>,
}

impl<M: MuxAdapter, P: ProcessControl> SessionManager<M, P> {
    /// Dispose a session, local or remote.
    pub async fn dispose(&self, id: &str) -> Result<DisposeReport, EngineError> {
        let session = self.get_session(id)?;
        if session.is_remote() {
            return self.dispose_remote(session).await;
        }
        self.dispose_local(session).await
    }

    async fn dispose_local(&self, session: Session) -> Result<DisposeReport, EngineError> {
        let id = session.id.to_string();
        let mut warnings = Vec::new();
        let grace = sx_adapters::env::kill_grace();

        if session.pid > 0 {
            if let Err(e) = self.procs.terminate(session.pid, grace).await {
                warnings.push(format!("process group kill failed: {e}"));
            }
        }

        // Sweep for forked children still working inside the workspace.
        if let Some(workspace) = self.store.get_workspace(&session.workspace_id) {
            if !workspace.is_remote() {
                let orphans = self
                    .procs
                    .orphans_under(&workspace.path, &[session.pid])
                    .await;
                for pid in orphans {
                    tracing::info!(session_id = %id, pid, "killing workspace orphan");
                    if let Err(e) = self.procs.terminate(pid, grace).await {
                        warnings.push(format!("orphan {pid} kill failed: {e}"));
                    }
                }
            }
        }

        if let Err(e) = self.mux.kill(&session.tmux_session).await {
            warnings.push(format!("window kill failed: {e}"));
        }

        self.stop_tracker(&id).await;

        self.store.remove_session(&id);
        self.store.save()?;

        // Workspaces persist; they are not cleaned up with the session.
        tracing::info!(session_id = %id, warnings = warnings.len(), "session disposed");
        Ok(DisposeReport {
            session_id: id,
            warnings,
        })
    }

    async fn dispose_remote(&self, session: Session) -> Result<DisposeReport, EngineError> {
        let id = session.id.to_string();
        let mut warnings = Vec::new();

        match self.connection_for_host(&session.remote_host_id).await {
            Some(conn) if !session.remote_window.is_empty() => {
                if let Err(e) = conn.kill_session(&session.remote_window).await {
                    warnings.push(format!("remote window kill failed: {e}"));
                }
            }
            Some(_) => {
                // Still provisioning: nothing was created remotely.
            }
            None => {
                warnings.push("no control connection for host".to_string());
            }
        }

        self.stop_remote_monitor(&id).await;

        // The shared remote workspace stays: other sessions on the host
        // may still use it.
        self.store.remove_session(&id);
        self.store.save()?;

        tracing::info!(session_id = %id, warnings = warnings.len(), "remote session disposed");
        Ok(DisposeReport {
            session_id: id,
            warnings,
        })
    }
}

#[cfg(test)]
#[path = "dispose_tests.rs"]
mod tests;
