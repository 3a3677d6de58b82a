// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Resolve state directory: SCHMUX_STATE_DIR > XDG_STATE_HOME/schmux >
/// ~/.local/state/schmux
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SCHMUX_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("schmux"));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local/state/schmux"))
}
