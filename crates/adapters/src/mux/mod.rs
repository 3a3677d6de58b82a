// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local multiplexer adapters

mod tmux;

pub use tmux::TmuxMux;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMux, FakeWindow, MuxCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from multiplexer operations
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("window not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("command timed out")]
    Timeout,
}

/// Terminal window dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

/// Adapter for the local terminal multiplexer.
///
/// One window per session, addressed by the session's window name. All
/// operations shell out to the multiplexer binary under a bounded timeout.
#[async_trait]
pub trait MuxAdapter: Clone + Send + Sync + 'static {
    /// Create a detached window running `command` in `cwd` at a fixed size.
    /// Returns the pane's process id.
    async fn create(
        &self,
        name: &str,
        cwd: &Path,
        command: &str,
        size: WindowSize,
    ) -> Result<i32, MuxError>;

    /// Kill a window. Killing an already-dead window is not an error.
    async fn kill(&self, name: &str) -> Result<(), MuxError>;

    /// Check whether a window exists.
    async fn exists(&self, name: &str) -> Result<bool, MuxError>;

    /// Rename a window.
    async fn rename(&self, old: &str, new: &str) -> Result<(), MuxError>;

    /// Send literal keystrokes to a window (no key-name interpretation).
    async fn send_keys(&self, name: &str, data: &str) -> Result<(), MuxError>;

    /// Capture the last `lines` lines of a window's scrollback.
    async fn capture_lines(&self, name: &str, lines: u32) -> Result<String, MuxError>;

    /// Current window dimensions.
    async fn window_size(&self, name: &str) -> Result<WindowSize, MuxError>;

    /// Resize a window.
    async fn resize_window(&self, name: &str, size: WindowSize) -> Result<(), MuxError>;

    /// Apply status-bar styling (left/right text, cleared center). Failures
    /// are non-fatal and logged by the implementation.
    async fn set_status(&self, name: &str, left: &str, right: &str) -> Result<(), MuxError>;

    /// Process id of the window's pane.
    async fn pane_pid(&self, name: &str) -> Result<i32, MuxError>;
}
