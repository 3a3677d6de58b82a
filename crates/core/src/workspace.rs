// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace record.
//!
//! A workspace is a checkout an agent runs in: a local filesystem path, or
//! a working directory on a remote host. Workspaces are created by the
//! workspace collaborator and referenced by sessions; they are never removed
//! while a session holds them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a workspace.
    pub struct WorkspaceId;
}

/// Persisted workspace record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub repo: String,
    pub branch: String,
    /// Local filesystem path, or the working directory on the remote host.
    pub path: PathBuf,
    #[serde(default)]
    pub remote_host_id: String,
    #[serde(default)]
    pub remote_flavor_id: String,
}

impl Workspace {
    pub fn is_remote(&self) -> bool {
        !self.remote_host_id.is_empty()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Workspace {
    /// Minimal local workspace for tests.
    pub fn test_local(id: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            id: WorkspaceId::new(id),
            repo: "example/repo".to_string(),
            branch: "main".to_string(),
            path: path.into(),
            remote_host_id: String::new(),
            remote_flavor_id: String::new(),
        }
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
