// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved spawn targets and per-tool launch knowledge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Where a target definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A tool found on PATH during detection (e.g. plain `claude`).
    Detected,
    /// A model variant layered on a detected base tool.
    Model,
    /// A user-configured raw command.
    User,
}

/// Model descriptor carried by model-kind targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Base tool the model runs through (must be in the detected list).
    pub base_tool: String,
    /// CLI flag used to select the model (e.g. `-m`), if the tool takes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A fully resolved spawn target: command, environment, promptability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub kind: TargetKind,
    pub command: String,
    pub promptable: bool,
    /// Environment for the agent process. May include model selectors and
    /// secrets; sorted emission is guaranteed by the BTreeMap.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelDescriptor>,
}

impl Target {
    /// Base tool name used for tool-specific behavior (resume parts,
    /// signaling flags): the model's base tool, or the first word of the
    /// command.
    pub fn base_tool(&self) -> &str {
        if let Some(model) = &self.model {
            return &model.base_tool;
        }
        self.command.split_whitespace().next().unwrap_or_default()
    }

    /// Validate the prompt against promptability.
    pub fn check_prompt(&self, prompt: &str) -> Result<(), TargetError> {
        if self.promptable && prompt.is_empty() {
            return Err(TargetError::PromptRequired {
                target: self.name.clone(),
            });
        }
        if !self.promptable && !prompt.is_empty() {
            return Err(TargetError::PromptForbidden {
                target: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Target validation errors.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("prompt is required for target {target}")]
    PromptRequired { target: String },
    #[error("target {target} does not accept a prompt")]
    PromptForbidden { target: String },
}

/// How a tool accepts signaling instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalInjection {
    /// Flag takes instruction text directly; usable locally and remotely.
    Inline(&'static str),
    /// Flag takes a local file path; omitted for remote spawns.
    File(&'static str),
    /// Tool has no injection hook.
    None,
}

/// Static launch knowledge for a base tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Process name used for orphan/liveness matching.
    pub process_name: String,
    pub signal: SignalInjection,
    /// Resume command parts, replacing the target command on resume.
    pub resume: Option<&'static str>,
}

/// Look up launch knowledge for a base tool. Unknown tools get a spec with
/// no signaling hook and no resume support.
pub fn tool_spec(base_tool: &str) -> ToolSpec {
    match base_tool {
        "claude" => ToolSpec {
            process_name: "claude".to_string(),
            signal: SignalInjection::Inline("--append-system-prompt"),
            resume: Some("claude --continue"),
        },
        "codex" => ToolSpec {
            process_name: "codex".to_string(),
            signal: SignalInjection::File("--instructions-file"),
            resume: Some("codex resume --last"),
        },
        other => ToolSpec {
            process_name: other.to_string(),
            signal: SignalInjection::None,
            resume: None,
        },
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Target {
    /// Promptable detected-tool target for tests.
    pub fn test_promptable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: TargetKind::Detected,
            command: name.to_string(),
            promptable: true,
            env: BTreeMap::new(),
            model: None,
        }
    }

    /// Non-promptable user-command target for tests.
    pub fn test_command(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: TargetKind::User,
            command: command.to_string(),
            promptable: false,
            env: BTreeMap::new(),
            model: None,
        }
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
