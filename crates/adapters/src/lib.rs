// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sx-adapters: process, multiplexer, PTY and remote-host adapters.
//!
//! Everything that touches the outside world lives here, behind traits the
//! engine can swap for fakes in tests: the tmux adapter, the PTY attach,
//! process-group termination, the control-mode remote connection, and the
//! signal detector + filesystem watcher.

pub mod detect;
pub mod env;
pub mod mux;
pub mod process;
pub mod pty;
pub mod remote;

pub use detect::{read_signal_file, SignalDetector, SignalFileWatcher};
pub use mux::{MuxAdapter, MuxError, TmuxMux, WindowSize};
pub use process::{ProcessControl, ProcessError, UnixProcesses};
pub use pty::{PtyAttach, PtyError, PtyHandle};
pub use remote::{OutputEvent, RemoteConnection, RemoteError};

#[cfg(any(test, feature = "test-support"))]
pub use mux::{FakeMux, MuxCall};
#[cfg(any(test, feature = "test-support"))]
pub use process::{FakeProcesses, ProcessCall};
