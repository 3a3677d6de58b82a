// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote host and flavor records.
//!
//! A flavor is a named template describing how to reach a class of remote
//! hosts; a host is one concrete connection made through a flavor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a remote host.
    pub struct HostId;
}

/// Connection status of a remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Provisioning,
    Connecting,
    Connected,
    Disconnected,
    Expired,
    Reconnecting,
}

/// Persisted host record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub flavor_id: String,
    /// Discovered at connect time via the flavor's hostname regex.
    #[serde(default)]
    pub hostname: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub status: HostStatus,
    /// Set once the flavor's provision command has exited 0 on this host.
    #[serde(default)]
    pub provisioned: bool,
}

/// Default connect command when a flavor does not override it.
pub const DEFAULT_CONNECT_COMMAND: &str = "ssh {{.Flavor}}";

/// Default regex extracting the hostname from connect-command output.
pub const DEFAULT_HOSTNAME_REGEX: &str = r"Establish ControlMaster connection to (\S+)";

/// A named template describing how to connect to a class of remote hosts.
///
/// The connect/reconnect templates are expanded with `{{.Flavor}}` /
/// `{{.Hostname}}`; control-mode flags are appended by the remote
/// connection, not by the template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub flavor: String,
    #[serde(default)]
    pub display_name: String,
    /// Version control system available on the host ("git", "jj", ...).
    #[serde(default)]
    pub vcs: String,
    /// Working directory for agent workspaces on the host.
    #[serde(default)]
    pub workspace_path: String,
    #[serde(default = "default_connect_command")]
    pub connect_command: String,
    #[serde(default)]
    pub reconnect_command: String,
    #[serde(default)]
    pub provision_command: String,
    #[serde(default = "default_hostname_regex")]
    pub hostname_regex: String,
    #[serde(default)]
    pub vscode_command: String,
}

fn default_connect_command() -> String {
    DEFAULT_CONNECT_COMMAND.to_string()
}

fn default_hostname_regex() -> String {
    DEFAULT_HOSTNAME_REGEX.to_string()
}

impl Flavor {
    /// Connect command with flavor bindings expanded.
    pub fn expand_connect(&self) -> String {
        crate::template::expand(&self.connect_command, &[("Flavor", &self.flavor)])
    }

    /// Reconnect command for a known hostname; falls back to the connect
    /// command when the flavor has no reconnect template.
    pub fn expand_reconnect(&self, hostname: &str) -> String {
        if self.reconnect_command.is_empty() {
            return self.expand_connect();
        }
        crate::template::expand(
            &self.reconnect_command,
            &[("Flavor", &self.flavor), ("Hostname", hostname)],
        )
    }

    /// Provision command with workspace bindings expanded; None when the
    /// flavor has no provisioning step.
    pub fn expand_provision(&self) -> Option<String> {
        if self.provision_command.is_empty() {
            return None;
        }
        Some(crate::template::expand(
            &self.provision_command,
            &[
                ("WorkspacePath", &self.workspace_path),
                ("VCS", &self.vcs),
            ],
        ))
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Flavor {
    /// Minimal ssh flavor for tests.
    pub fn test_ssh(id: &str) -> Self {
        Self {
            id: id.to_string(),
            flavor: id.to_string(),
            display_name: id.to_string(),
            vcs: "git".to_string(),
            workspace_path: "/workspace".to_string(),
            connect_command: default_connect_command(),
            reconnect_command: String::new(),
            provision_command: String::new(),
            hostname_regex: default_hostname_regex(),
            vscode_command: String::new(),
        }
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
