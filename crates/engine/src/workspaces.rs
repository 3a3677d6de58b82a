// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lookup and creation.
//!
//! Local workspaces are directories under the daemon's workspaces root,
//! one per repo+branch. All remote sessions on one host share a single
//! workspace record pointing at the flavor's workspace path.

use crate::error::EngineError;
use std::path::{Path, PathBuf};
use sx_core::{sanitize_window_name, short_uuid, Flavor, Host, Workspace, WorkspaceId};
use sx_storage::StateStore;

/// How a spawn request names its workspace.
#[derive(Debug, Clone)]
pub enum WorkspaceSelector {
    /// An existing workspace by id.
    Id(String),
    /// Lookup (or create) by repo and branch; `new_branch` switches the
    /// fresh workspace to a new branch name.
    RepoBranch {
        repo: String,
        branch: String,
        new_branch: Option<String>,
    },
}

/// Resolve a selector to a workspace, creating the directory on first use.
pub fn obtain_workspace(
    store: &StateStore,
    root: &Path,
    selector: &WorkspaceSelector,
) -> Result<Workspace, EngineError> {
    match selector {
        WorkspaceSelector::Id(id) => store
            .get_workspace(id)
            .ok_or_else(|| EngineError::WorkspaceNotFound(id.clone())),
        WorkspaceSelector::RepoBranch {
            repo,
            branch,
            new_branch,
        } => {
            let branch = new_branch.as_deref().unwrap_or(branch);
            if let Some(existing) = store
                .get_workspaces()
                .into_iter()
                .find(|w| !w.is_remote() && w.repo == *repo && w.branch == branch)
            {
                return Ok(existing);
            }
            create_workspace(store, root, repo, branch)
        }
    }
}

fn create_workspace(
    store: &StateStore,
    root: &Path,
    repo: &str,
    branch: &str,
) -> Result<Workspace, EngineError> {
    let repo_name = repo.rsplit('/').next().unwrap_or(repo);
    let mut id = sanitize_window_name(&format!("{repo_name}-{branch}")).replace('/', "-");
    if store.get_workspace(&id).is_some() {
        id = format!("{id}-{}", short_uuid());
    }

    let path = root.join(&id);
    std::fs::create_dir_all(&path)?;

    let workspace = Workspace {
        id: WorkspaceId::new(id),
        repo: repo.to_string(),
        branch: branch.to_string(),
        path,
        remote_host_id: String::new(),
        remote_flavor_id: String::new(),
    };
    store.add_workspace(workspace.clone());
    tracing::info!(workspace = %workspace.id, path = %workspace.path.display(), "workspace created");
    Ok(workspace)
}

/// Find or create the shared workspace for a remote host. The branch
/// defaults to the discovered hostname.
pub fn obtain_remote_workspace(store: &StateStore, host: &Host, flavor: &Flavor) -> Workspace {
    if let Some(existing) = store
        .get_workspaces()
        .into_iter()
        .find(|w| w.remote_host_id == host.id.as_str())
    {
        return existing;
    }

    let branch = if host.hostname.is_empty() {
        flavor.flavor.clone()
    } else {
        host.hostname.clone()
    };
    let workspace = Workspace {
        id: WorkspaceId::new(format!("remote-{}", host.id)),
        repo: flavor.id.clone(),
        branch,
        path: PathBuf::from(&flavor.workspace_path),
        remote_host_id: host.id.to_string(),
        remote_flavor_id: flavor.id.clone(),
    };
    store.add_workspace(workspace.clone());
    workspace
}

/// Signaling instructions injected into agents.
///
/// Inline-capable tools receive this text directly; file-based tools get
/// the path of the copy written into the workspace.
pub const SIGNAL_INSTRUCTIONS: &str = "\
When your working status changes, append one JSON line to the file \
`.schmux/signal` in the workspace root: \
{\"state\":\"working|needs_input|completed|error\",\"summary\":\"short reason\"}. \
Use needs_input when blocked on authorization, feature clarification, or \
user testing; completed when the task is finished; error when you cannot \
continue.";

/// Write the signaling instructions file for file-based tools. Returns the
/// file path.
pub fn provision_instructions(workspace_path: &Path) -> std::io::Result<PathBuf> {
    let dir = workspace_path.join(".schmux");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("SIGNALS.md");
    std::fs::write(&path, SIGNAL_INSTRUCTIONS)?;
    Ok(path)
}

#[cfg(test)]
#[path = "workspaces_tests.rs"]
mod tests;
