// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted state shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sx_core::{Host, Session, Workspace};

/// Everything the daemon persists, keyed by record id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StateData {
    #[serde(default)]
    pub sessions: HashMap<String, Session>,
    #[serde(default)]
    pub workspaces: HashMap<String, Workspace>,
    #[serde(default)]
    pub hosts: HashMap<String, Host>,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
