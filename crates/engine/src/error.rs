// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy.
//!
//! Kinds map onto HTTP at the daemon boundary: not-found → 404,
//! validation → 400, conflict → 409, unavailable → 503. Everything else is
//! transient or fatal and surfaces as 500.

use sx_adapters::{MuxError, PtyError, RemoteError};
use sx_core::{CommandError, TargetError};
use sx_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("remote flavor not found: {0}")]
    FlavorNotFound(String),

    #[error("tool {tool} is not available for target {target}")]
    ToolUnavailable { target: String, tool: String },

    #[error("{0}")]
    Validation(String),

    #[error("window name {name} is taken by session {existing}")]
    Conflict { name: String, existing: String },

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Not-found kind (404 at the HTTP boundary).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::SessionNotFound(_)
                | EngineError::WorkspaceNotFound(_)
                | EngineError::TargetNotFound(_)
                | EngineError::FlavorNotFound(_)
        )
    }

    /// Validation kind (400).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::Target(_)
                | EngineError::ToolUnavailable { .. }
        )
    }

    /// Conflict kind (409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }

    /// Unavailable kind (503).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::Remote(RemoteError::NotConnected))
    }
}
