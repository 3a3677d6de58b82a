// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream → signal extraction.
//!
//! Agents announce state changes in-band: a `SCHMUX_SIGNAL:{...}` JSON line
//! written by their hooks, or a short `[schmux:<state>]` marker. The
//! detector strips ANSI, accumulates lines across chunk boundaries, and
//! turns matches into [`Signal`] events.

use super::ansi::strip_ansi;
use serde::Deserialize;
use std::time::Duration;
use sx_core::{Signal, SignalState};

/// Callers should flush the detector after this much idle time so a token
/// without a trailing newline still produces its signal.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Line buffer cap. A single terminal line longer than this cannot carry a
/// valid token; older bytes are discarded from the front.
const MAX_LINE: usize = 8 * 1024;

const JSON_MARKER: &str = "SCHMUX_SIGNAL:";
const BRACKET_MARKER: &str = "[schmux:";

type SignalCallback = Box<dyn Fn(Signal) + Send + Sync>;
type NearMissCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Deserialize)]
struct JsonToken {
    state: String,
    #[serde(default)]
    summary: String,
}

/// Incremental detector over an agent's terminal byte stream.
pub struct SignalDetector {
    line: String,
    suppressed: bool,
    last: Option<Signal>,
    on_signal: SignalCallback,
    near_miss: Option<NearMissCallback>,
}

impl SignalDetector {
    pub fn new(on_signal: impl Fn(Signal) + Send + Sync + 'static) -> Self {
        Self {
            line: String::new(),
            suppressed: false,
            last: None,
            on_signal: Box::new(on_signal),
            near_miss: None,
        }
    }

    /// Install a hook receiving lines that looked like signals but did not
    /// fully match, for diagnostics.
    pub fn with_near_miss(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.near_miss = Some(Box::new(hook));
        self
    }

    /// While suppressed, transitions update `last_signal` without invoking
    /// the callback. Used during scrollback replay so historical signals
    /// are not re-emitted.
    pub fn suppress(&mut self, on: bool) {
        self.suppressed = on;
    }

    /// Most recent signal observed, including suppressed ones.
    pub fn last_signal(&self) -> Option<&Signal> {
        self.last.as_ref()
    }

    /// Feed a chunk of raw terminal bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        let stripped = strip_ansi(chunk);
        let text = String::from_utf8_lossy(&stripped);
        for c in text.chars() {
            if c == '\n' || c == '\r' {
                let line = std::mem::take(&mut self.line);
                self.scan_line(&line);
            } else {
                self.line.push(c);
            }
        }
        if self.line.len() > MAX_LINE {
            let excess = self.line.len() - MAX_LINE;
            let cut = (excess..self.line.len())
                .find(|i| self.line.is_char_boundary(*i))
                .unwrap_or(self.line.len());
            self.line.drain(..cut);
        }
    }

    /// Consolidate any buffered partial line.
    pub fn flush(&mut self) {
        if self.line.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.line);
        self.scan_line(&line);
    }

    fn scan_line(&mut self, line: &str) {
        if let Some(idx) = line.find(JSON_MARKER) {
            let payload = line[idx + JSON_MARKER.len()..].trim();
            match serde_json::from_str::<JsonToken>(payload) {
                Ok(token) => match SignalState::parse(&token.state) {
                    Some(state) => self.emit(state, token.summary),
                    None => self.miss(line),
                },
                Err(_) => self.miss(line),
            }
            return;
        }

        if let Some(idx) = line.find(BRACKET_MARKER) {
            let rest = &line[idx + BRACKET_MARKER.len()..];
            let Some(end) = rest.find(']') else {
                self.miss(line);
                return;
            };
            match SignalState::parse(&rest[..end]) {
                Some(state) => {
                    let message = rest[end + 1..].trim().to_string();
                    self.emit(state, message);
                }
                None => self.miss(line),
            }
        }
    }

    fn emit(&mut self, state: SignalState, message: String) {
        let signal = Signal::now(state, message);
        self.last = Some(signal.clone());
        if !self.suppressed {
            (self.on_signal)(signal);
        }
    }

    fn miss(&self, line: &str) {
        if let Some(hook) = &self.near_miss {
            hook(line);
        }
    }
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod tests;
