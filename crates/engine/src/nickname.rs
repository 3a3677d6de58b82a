// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Nickname uniqueness.

use rand::Rng;
use sx_core::sanitize_window_name;

/// Numeric suffixes tried before giving up and appending a random one.
const MAX_NUMERIC_SUFFIX: u32 = 100;

/// Make `base` unique against the sessions' window names.
///
/// `taken` holds the sanitized window names already in use; candidates
/// compare by their own sanitized form, so two nicknames that collapse to
/// the same window name (`feat.x`, `feat:x`) cannot coexist. Conflicts get
/// a numeric suffix `base (1)`, `base (2)`, … up to 100; beyond that a
/// short random suffix is appended.
pub fn unique_nickname(base: &str, taken: &[String]) -> String {
    let is_taken = |candidate: &str| {
        let sanitized = sanitize_window_name(candidate);
        taken.iter().any(|t| *t == sanitized)
    };

    if !is_taken(base) {
        return base.to_string();
    }
    for n in 1..=MAX_NUMERIC_SUFFIX {
        let candidate = format!("{base} ({n})");
        if !is_taken(&candidate) {
            return candidate;
        }
    }
    let suffix: u32 = rand::rng().random_range(0x1000..0xFFFF);
    format!("{base} ({suffix:x})")
}

#[cfg(test)]
#[path = "nickname_tests.rs"]
mod tests;
