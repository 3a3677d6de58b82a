// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem signal file: `<workspace>/.schmux/signal`.
//!
//! Agents (or their hooks) write either a single JSON document
//! `{state, summary, timestamp}` or newline-delimited JSON where the last
//! line wins. The watcher feeds changes to the tracker's signal pipeline;
//! a one-shot read recovers state after a daemon restart.

use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use sx_core::{Signal, SignalState};
use tokio::sync::mpsc;

#[derive(Deserialize)]
struct RawSignal {
    state: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

fn parse_doc(doc: &str) -> Option<Signal> {
    let raw: RawSignal = serde_json::from_str(doc).ok()?;
    let state = SignalState::parse(&raw.state)?;
    Some(Signal {
        state,
        message: raw.summary,
        timestamp: raw.timestamp.unwrap_or_else(Utc::now),
    })
}

/// Read the current signal from a signal file.
///
/// Whole-document parse first; otherwise the last parseable line wins.
/// Returns `None` for a missing, empty or unparseable file.
pub fn read_signal_file(path: &Path) -> Option<Signal> {
    let raw = std::fs::read_to_string(path).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(signal) = parse_doc(trimmed) {
        return Some(signal);
    }
    trimmed.lines().rev().find_map(|line| {
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            parse_doc(line)
        }
    })
}

/// Watches a workspace's signal file and emits signals on change.
pub struct SignalFileWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl SignalFileWatcher {
    /// Start watching `<workspace_root>/.schmux/signal`.
    ///
    /// The `.schmux` directory is created if missing so the watch can be
    /// established before the agent's first write.
    pub fn start(
        workspace_root: &Path,
        on_signal: impl Fn(Signal) + Send + Sync + 'static,
    ) -> Result<Self, notify::Error> {
        let dir = workspace_root.join(".schmux");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("signal");

        let (tx, mut rx) = mpsc::channel::<()>(8);
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if res.is_ok() {
                let _ = tx.blocking_send(());
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let task_path = path.clone();
        let task = tokio::spawn(async move {
            let mut last: Option<Signal> = None;
            let mut parse_error_logged = false;
            while rx.recv().await.is_some() {
                match read_signal_file(&task_path) {
                    Some(signal) => {
                        parse_error_logged = false;
                        if last.as_ref() == Some(&signal) {
                            continue;
                        }
                        last = Some(signal.clone());
                        on_signal(signal);
                    }
                    None => {
                        // Discard unparseable payloads; log once per streak.
                        if task_path.exists() && !parse_error_logged {
                            tracing::warn!(path = %task_path.display(), "unparseable signal file, ignoring");
                            parse_error_logged = true;
                        }
                    }
                }
            }
        });

        Ok(Self {
            path,
            _watcher: watcher,
            task,
        })
    }

    /// One-shot read of the current on-disk signal.
    pub fn current(&self) -> Option<Signal> {
        read_signal_file(&self.path)
    }

    /// Stop the watcher task.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for SignalFileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "signal_file_tests.rs"]
mod tests;
