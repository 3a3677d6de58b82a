// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent command-line construction.
//!
//! The spawn path builds one shell string that the multiplexer runs via
//! `/bin/sh -c`: an environment prefix, the target command (or its resume
//! parts), optional model and signaling flags, and the shell-quoted prompt.

use crate::target::{tool_spec, SignalInjection, Target};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Command construction errors.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("target {target} does not support resume")]
    ResumeUnsupported { target: String },
}

/// Quote a string for a POSIX shell using single quotes.
///
/// Embedded single quotes use the `'\''` close-escape-reopen idiom.
pub fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Emit `K='v'` pairs sorted by key, space-separated.
///
/// The BTreeMap guarantees deterministic ordering, which the spawn tests
/// (and humans reading `ps` output) rely on.
pub fn env_prefix(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Signaling context for command construction.
///
/// Locally the instructions live in a file under the workspace; remotely
/// that path is meaningless, so inline-capable tools get the content
/// directly and file-only tools get no signaling at all.
#[derive(Debug, Clone)]
pub struct SignalContext<'a> {
    /// Instruction text for inline-capable tools.
    pub instructions: &'a str,
    /// Local instructions file for file-based tools.
    pub file: Option<&'a Path>,
    /// True when the command will run on a remote host.
    pub remote: bool,
}

impl<'a> SignalContext<'a> {
    pub fn local(instructions: &'a str, file: &'a Path) -> Self {
        Self {
            instructions,
            file: Some(file),
            remote: false,
        }
    }

    pub fn remote(instructions: &'a str) -> Self {
        Self {
            instructions,
            file: None,
            remote: true,
        }
    }
}

/// Build the full shell command for a spawn.
///
/// `env` is the merged environment (target env, secrets, signaling vars).
/// On resume the prompt is ignored; prompt validation against the target's
/// promptability is the caller's job (`Target::check_prompt`).
pub fn build_command(
    target: &Target,
    prompt: &str,
    resume: bool,
    env: &BTreeMap<String, String>,
    signals: &SignalContext<'_>,
) -> Result<String, CommandError> {
    let spec = tool_spec(target.base_tool());

    let mut parts: Vec<String> = Vec::new();
    let prefix = env_prefix(env);
    if !prefix.is_empty() {
        parts.push(prefix);
    }

    if resume {
        let resume_parts = spec.resume.ok_or_else(|| CommandError::ResumeUnsupported {
            target: target.name.clone(),
        })?;
        parts.push(resume_parts.to_string());
    } else {
        parts.push(target.command.clone());
        if let Some(model) = &target.model {
            if let (Some(flag), Some(value)) = (&model.flag, &model.value) {
                parts.push(flag.clone());
                parts.push(shell_quote(value));
            }
        }
    }

    match spec.signal {
        SignalInjection::Inline(flag) if !signals.instructions.is_empty() => {
            parts.push(flag.to_string());
            parts.push(shell_quote(signals.instructions));
        }
        SignalInjection::File(flag) if !signals.remote => {
            if let Some(file) = signals.file {
                parts.push(flag.to_string());
                parts.push(shell_quote(&file.display().to_string()));
            }
        }
        _ => {}
    }

    if !resume && target.promptable && !prompt.is_empty() {
        parts.push(shell_quote(prompt));
    }

    Ok(parts.join(" "))
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
