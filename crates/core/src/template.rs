// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restricted template expansion for remote command templates.
//!
//! Templates are data: the only supported syntax is `{{.Name}}` bindings
//! from a fixed set (Flavor, Hostname, WorkspacePath, VCS, VSCodePath,
//! Path). There is no code execution, no conditionals, no nesting.

/// Expand `{{.Name}}` bindings in a template.
///
/// Single pass over the input: bound values are emitted verbatim and never
/// re-expanded. Unknown bindings are left in place so a misconfigured
/// template is visible in logs rather than silently truncated.
pub fn expand(template: &str, bindings: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{.") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find("}}") {
            Some(end) => {
                let name = &tail[3..end];
                match bindings.iter().find(|(n, _)| *n == name) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&tail[..end + 2]),
                }
                rest = &tail[end + 2..];
            }
            None => {
                out.push_str(tail);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
