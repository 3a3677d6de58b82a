// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sx-engine: session lifecycle and streaming.
//!
//! The manager owns the session set and the per-session supervisors: a
//! Tracker holding a persistent PTY attach for each local session, and a
//! signal monitor subscribed to the control channel for each remote one.

mod dispose;
mod env;
mod error;
mod manager;
mod monitor;
mod nickname;
mod signals;
mod spawn;
mod targets;
#[cfg(test)]
mod test_helpers;
mod tracker;
mod utf8;
mod workspaces;

pub use error::EngineError;
pub use manager::{DisposeReport, SessionManager, WorkspaceSelector};
pub use monitor::{MonitorHooks, RemoteMonitor};
pub use nickname::unique_nickname;
pub use signals::apply_signal;
pub use spawn::{SpawnOutcome, SpawnRequest};
pub use targets::{detect_tools, resolve_target};
pub use tracker::{pty_attach_fn, AttachFn, Tracker, TrackerHooks};
pub use utf8::complete_prefix_len;
