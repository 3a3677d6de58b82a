// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Byte-level ANSI escape handling.
//!
//! The hot path works on byte slices: terminal chunks may split escape
//! sequences and UTF-8 codepoints at arbitrary offsets, so nothing here
//! assumes valid UTF-8 input.

/// Strip ANSI escape sequences from a byte slice.
///
/// Handles CSI (`ESC [` ... final byte `@`..`~`), OSC (`ESC ]` ... BEL or
/// `ESC \`) and single-character escapes. Incomplete trailing sequences are
/// dropped; callers feeding a line at a time do not care about a dangling
/// escape that the next chunk completes.
pub fn strip_ansi(input: &[u8]) -> Vec<u8> {
    #[derive(PartialEq)]
    enum State {
        Plain,
        Esc,
        Csi,
        Osc,
        OscEsc,
    }

    let mut out = Vec::with_capacity(input.len());
    let mut state = State::Plain;

    for &b in input {
        match state {
            State::Plain => {
                if b == 0x1b {
                    state = State::Esc;
                } else {
                    out.push(b);
                }
            }
            State::Esc => {
                state = match b {
                    b'[' => State::Csi,
                    b']' => State::Osc,
                    // Two-byte escape (charset selection etc.)
                    _ => State::Plain,
                };
            }
            State::Csi => {
                // Parameter/intermediate bytes run 0x20..=0x3F, final 0x40..=0x7E
                if (0x40..=0x7e).contains(&b) {
                    state = State::Plain;
                }
            }
            State::Osc => {
                if b == 0x07 {
                    state = State::Plain;
                } else if b == 0x1b {
                    state = State::OscEsc;
                }
            }
            State::OscEsc => {
                // ESC \ terminates; anything else returns to the OSC body
                state = if b == b'\\' { State::Plain } else { State::Osc };
            }
        }
    }
    out
}

/// True when the (already ANSI-stripped) bytes contain any printable,
/// non-whitespace character.
pub fn has_printable(input: &[u8]) -> bool {
    let text = String::from_utf8_lossy(input);
    text.chars().any(|c| !c.is_whitespace() && !c.is_control())
}

/// Prefixes of terminal query responses (device attributes, color queries)
/// that terminals emit automatically and must never be treated as user
/// activity or forwarded as input.
const QUERY_RESPONSE_PREFIXES: [&[u8]; 4] = [b"\x1b[?", b"\x1b[>", b"\x1b]10;", b"\x1b]11;"];

/// True when the chunk starts with a known terminal-query-response prefix.
pub fn is_terminal_query_response(data: &[u8]) -> bool {
    QUERY_RESPONSE_PREFIXES
        .iter()
        .any(|prefix| data.starts_with(prefix))
}

#[cfg(test)]
#[path = "ansi_tests.rs"]
mod tests;
