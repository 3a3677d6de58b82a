// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY attachments to multiplexer windows.
//!
//! A tracker (or a WebSocket bridge) attaches to a window by running
//! `tmux attach-session -t <window>` as a child under a pseudo-terminal.
//! The PTY gives us the raw byte stream the window renders, including
//! escape sequences, which `capture-pane` would normalize away.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use thiserror::Error;

use crate::mux::WindowSize;

/// Errors from PTY operations
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    Open(String),
    #[error("failed to spawn attach child: {0}")]
    Spawn(String),
    #[error("pty write failed: {0}")]
    Write(String),
    #[error("invalid dimensions: {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },
    #[error("no pty attached")]
    NotAttached,
}

fn pty_size(size: WindowSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Writable half of a PTY attachment: input, resize, child lifetime.
///
/// The reader is split off at open time so the supervisor's blocking read
/// loop never contends with input or resize calls.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
}

impl PtyHandle {
    /// Write input bytes to the attached window.
    pub fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer
            .write_all(data)
            .and_then(|_| self.writer.flush())
            .map_err(|e| PtyError::Write(e.to_string()))
    }

    /// Resize the PTY. Dimensions must be positive.
    pub fn resize(&self, size: WindowSize) -> Result<(), PtyError> {
        if size.cols == 0 || size.rows == 0 {
            return Err(PtyError::InvalidSize {
                cols: size.cols,
                rows: size.rows,
            });
        }
        self.master
            .resize(pty_size(size))
            .map_err(|e| PtyError::Write(e.to_string()))
    }

    /// Kill the attach child and reap it. Idempotent.
    pub fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

/// A fresh PTY attachment: the blocking reader plus the writable handle.
pub struct PtyAttach {
    pub reader: Box<dyn Read + Send>,
    pub handle: PtyHandle,
}

impl PtyAttach {
    /// Attach to a multiplexer window at the given size.
    pub fn open(window: &str, size: WindowSize) -> Result<Self, PtyError> {
        Self::open_command(attach_command(window), size)
    }

    /// Spawn an arbitrary command under a PTY (used by tests with commands
    /// that do not need a tmux server).
    pub fn open_command(cmd: CommandBuilder, size: WindowSize) -> Result<Self, PtyError> {
        let pty = native_pty_system();
        let pair = pty
            .openpty(pty_size(size))
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        // The slave fd must be dropped so reads see EOF when the child exits.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        Ok(Self {
            reader,
            handle: PtyHandle {
                master: pair.master,
                child,
                writer,
            },
        })
    }
}

/// `tmux attach-session -t <window>` under a PTY.
fn attach_command(window: &str) -> CommandBuilder {
    let mut cmd = CommandBuilder::new("tmux");
    cmd.args(["attach-session", "-t", window]);
    cmd
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
