// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal extraction from agent terminal output.
//!
//! Two sources produce [`sx_core::Signal`] events: the byte-stream detector
//! scanning live terminal output for status tokens, and the filesystem
//! watcher observing the workspace signal file agents write through their
//! hooks.

pub mod ansi;
mod detector;
mod signal_file;

pub use ansi::{has_printable, is_terminal_query_response, strip_ansi};
pub use detector::{SignalDetector, FLUSH_TIMEOUT};
pub use signal_file::{read_signal_file, SignalFileWatcher};
