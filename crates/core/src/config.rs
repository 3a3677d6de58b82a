// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration loaded from `<state_dir>/config.toml`.

use crate::host::Flavor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Fixed terminal size applied to multiplexer windows at spawn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TerminalSize {
    #[serde(default = "default_columns")]
    pub columns: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

fn default_columns() -> u16 {
    220
}

fn default_rows() -> u16 {
    50
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            rows: default_rows(),
        }
    }
}

/// A user-configured raw-command target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTarget {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub promptable: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A model target layered on a detected base tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTarget {
    pub name: String,
    pub base_tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Secrets merged into the agent environment (API keys etc.).
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Bearer token required on the HTTP/WS surface when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub terminal: TerminalSize,
    /// Timeout applied to every external command invocation.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default)]
    pub targets: Vec<UserTarget>,
    #[serde(default)]
    pub models: Vec<ModelTarget>,
    #[serde(default)]
    pub flavors: Vec<Flavor>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:7337".to_string()
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

impl Config {
    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::fresh());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&raw)?)
    }

    /// Default configuration (serde defaults applied, not `Default::default`
    /// which leaves listen_addr empty).
    pub fn fresh() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            auth_token: None,
            terminal: TerminalSize::default(),
            command_timeout_ms: default_command_timeout_ms(),
            targets: Vec::new(),
            models: Vec::new(),
            flavors: Vec::new(),
        }
    }

    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.command_timeout_ms)
    }

    pub fn flavor(&self, id: &str) -> Option<&Flavor> {
        self.flavors.iter().find(|f| f.id == id)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
