// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target resolution: name → command, environment, promptability.
//!
//! Resolution order: model targets, then user-configured commands, then
//! tools detected on PATH. Model targets run through a detected base tool
//! and merge their secrets into the agent environment.

use crate::error::EngineError;
use std::collections::BTreeMap;
use sx_core::{Config, ModelDescriptor, Target, TargetKind};

/// Agent tools the daemon knows how to drive.
const KNOWN_TOOLS: [&str; 2] = ["claude", "codex"];

/// Scan PATH for known agent tools.
pub fn detect_tools() -> Vec<String> {
    let path = std::env::var_os("PATH").unwrap_or_default();
    let dirs: Vec<_> = std::env::split_paths(&path).collect();
    KNOWN_TOOLS
        .iter()
        .filter(|tool| dirs.iter().any(|d| d.join(tool).is_file()))
        .map(|tool| tool.to_string())
        .collect()
}

/// Resolve a target name against config and the detected-tools list.
pub fn resolve_target(
    config: &Config,
    detected: &[String],
    name: &str,
) -> Result<Target, EngineError> {
    if let Some(model) = config.models.iter().find(|m| m.name == name) {
        if !detected.iter().any(|t| t == &model.base_tool) {
            return Err(EngineError::ToolUnavailable {
                target: name.to_string(),
                tool: model.base_tool.clone(),
            });
        }
        let env: BTreeMap<String, String> = model.secrets.clone();
        return Ok(Target {
            name: model.name.clone(),
            kind: TargetKind::Model,
            command: model.base_tool.clone(),
            promptable: true,
            env,
            model: Some(ModelDescriptor {
                base_tool: model.base_tool.clone(),
                flag: model.flag.clone(),
                value: model.value.clone(),
            }),
        });
    }

    if let Some(user) = config.targets.iter().find(|t| t.name == name) {
        return Ok(Target {
            name: user.name.clone(),
            kind: TargetKind::User,
            command: user.command.clone(),
            promptable: user.promptable,
            env: user.env.clone(),
            model: None,
        });
    }

    if detected.iter().any(|t| t == name) {
        return Ok(Target {
            name: name.to_string(),
            kind: TargetKind::Detected,
            command: name.to_string(),
            promptable: true,
            env: BTreeMap::new(),
            model: None,
        });
    }

    Err(EngineError::TargetNotFound(name.to_string()))
}

#[cfg(test)]
#[path = "targets_tests.rs"]
mod tests;
