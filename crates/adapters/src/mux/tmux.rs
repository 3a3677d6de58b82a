// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux multiplexer adapter

use super::{MuxAdapter, MuxError, WindowSize};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Tmux-based multiplexer adapter.
///
/// Every invocation runs under `timeout`; on expiry the child is killed by
/// tokio and the call fails with [`MuxError::Timeout`].
#[derive(Clone)]
pub struct TmuxMux {
    timeout: Duration,
}

impl TmuxMux {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, MuxError> {
        let fut = Command::new("tmux").args(args).output();
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(MuxError::CommandFailed(e.to_string())),
            Err(_) => Err(MuxError::Timeout),
        }
    }
}

#[async_trait]
impl MuxAdapter for TmuxMux {
    async fn create(
        &self,
        name: &str,
        cwd: &Path,
        command: &str,
        size: WindowSize,
    ) -> Result<i32, MuxError> {
        // Precondition: cwd must exist
        if !cwd.exists() {
            return Err(MuxError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let cols = size.cols.to_string();
        let rows = size.rows.to_string();
        let cwd_str = cwd.display().to_string();
        let output = self
            .run(&[
                "new-session",
                "-d",
                "-s",
                name,
                "-c",
                &cwd_str,
                "-x",
                &cols,
                "-y",
                &rows,
                command,
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(window = name, stderr = %stderr, "tmux new-session failed");
            return Err(MuxError::SpawnFailed(stderr.to_string()));
        }

        // Log stderr even on success - may contain useful warnings
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(window = name, stderr = %stderr, "tmux new-session stderr (non-fatal)");
        }

        self.pane_pid(name).await
    }

    async fn kill(&self, name: &str) -> Result<(), MuxError> {
        let output = self.run(&["kill-session", "-t", name]).await?;
        if !output.status.success() {
            // Window might already be dead, which is fine
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, MuxError> {
        let output = self.run(&["has-session", "-t", name]).await?;
        Ok(output.status.success())
    }

    async fn rename(&self, old: &str, new: &str) -> Result<(), MuxError> {
        let output = self.run(&["rename-session", "-t", old, new]).await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(old.to_string()));
        }
        Ok(())
    }

    async fn send_keys(&self, name: &str, data: &str) -> Result<(), MuxError> {
        // -l = literal mode (no key name interpretation)
        // -- = end of options (handles data starting with -)
        let output = self.run(&["send-keys", "-t", name, "-l", "--", data]).await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn capture_lines(&self, name: &str, lines: u32) -> Result<String, MuxError> {
        let start = format!("-{}", lines);
        let output = self
            .run(&["capture-pane", "-t", name, "-p", "-e", "-S", &start])
            .await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn window_size(&self, name: &str) -> Result<WindowSize, MuxError> {
        let output = self
            .run(&[
                "display-message",
                "-t",
                name,
                "-p",
                "#{window_width} #{window_height}",
            ])
            .await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        parse_size(text.trim()).ok_or_else(|| {
            MuxError::CommandFailed(format!("unparseable window size: {:?}", text.trim()))
        })
    }

    async fn resize_window(&self, name: &str, size: WindowSize) -> Result<(), MuxError> {
        let cols = size.cols.to_string();
        let rows = size.rows.to_string();
        let output = self
            .run(&["resize-window", "-t", name, "-x", &cols, "-y", &rows])
            .await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn set_status(&self, name: &str, left: &str, right: &str) -> Result<(), MuxError> {
        self.set_option(name, "status-left", &format!(" {} ", left))
            .await;
        self.set_option(name, "status-right", &format!(" {} ", right))
            .await;
        // Clear the center so the window list does not fight the left text
        self.set_option(name, "window-status-current-format", "")
            .await;
        self.set_option(name, "window-status-format", "").await;
        Ok(())
    }

    async fn pane_pid(&self, name: &str) -> Result<i32, MuxError> {
        let output = self
            .run(&["list-panes", "-t", name, "-F", "#{pane_pid}"])
            .await?;
        if !output.status.success() {
            return Err(MuxError::NotFound(name.to_string()));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.lines()
            .next()
            .and_then(|l| l.trim().parse::<i32>().ok())
            .ok_or_else(|| MuxError::CommandFailed(format!("unparseable pane pid: {:?}", text)))
    }
}

impl TmuxMux {
    async fn set_option(&self, name: &str, option: &str, value: &str) {
        match self.run(&["set-option", "-t", name, option, value]).await {
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::warn!(window = name, option, value, stderr = %stderr, "tmux set-option failed");
                // Non-fatal: window works even if styling fails
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(window = name, option, error = %e, "tmux set-option failed");
            }
        }
    }
}

fn parse_size(s: &str) -> Option<WindowSize> {
    let mut parts = s.split_whitespace();
    let cols = parts.next()?.parse().ok()?;
    let rows = parts.next()?.parse().ok()?;
    Some(WindowSize { cols, rows })
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
