// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote host access over a multiplexer control-mode channel.
//!
//! One persistent connection per flavor multiplexes every remote session's
//! pane over a single transport: commands are written to the channel's
//! stdin and correlated FIFO with `%begin`/`%end` replies, while `%output`
//! notifications fan out to per-pane subscribers.

mod connection;
mod control;

pub use connection::{QueueResult, RemoteConnection};
pub use control::{decode_octal_escapes, parse_control_line, quote_arg, ControlLine};

use thiserror::Error;

/// Errors from remote operations
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("control channel not connected")]
    NotConnected,
    #[error("failed to start control channel: {0}")]
    SpawnFailed(String),
    #[error("remote command failed: {0}")]
    CommandFailed(String),
    #[error("remote command timed out")]
    Timeout,
    #[error("control channel closed")]
    ChannelClosed,
    #[error("unparseable control reply: {0}")]
    Parse(String),
}

/// Bytes observed on one remote pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub pane_id: String,
    pub data: String,
}
