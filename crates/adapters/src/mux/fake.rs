// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake multiplexer adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{MuxAdapter, MuxError, WindowSize};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded multiplexer call
#[derive(Debug, Clone)]
pub enum MuxCall {
    Create {
        name: String,
        cwd: PathBuf,
        command: String,
        size: WindowSize,
    },
    Kill {
        name: String,
    },
    Exists {
        name: String,
    },
    Rename {
        old: String,
        new: String,
    },
    SendKeys {
        name: String,
        data: String,
    },
    CaptureLines {
        name: String,
        lines: u32,
    },
    ResizeWindow {
        name: String,
        size: WindowSize,
    },
    SetStatus {
        name: String,
        left: String,
        right: String,
    },
}

/// Fake window state
#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub name: String,
    pub cwd: PathBuf,
    pub command: String,
    pub size: WindowSize,
    pub pid: i32,
    pub alive: bool,
    pub scrollback: Vec<String>,
}

struct FakeMuxState {
    windows: HashMap<String, FakeWindow>,
    calls: Vec<MuxCall>,
    next_pid: i32,
    fail_create: bool,
}

/// Fake multiplexer adapter for testing
#[derive(Clone)]
pub struct FakeMux {
    inner: Arc<Mutex<FakeMuxState>>,
}

impl Default for FakeMux {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeMuxState {
                windows: HashMap::new(),
                calls: Vec::new(),
                next_pid: 10_000,
                fail_create: false,
            })),
        }
    }
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<MuxCall> {
        self.inner.lock().calls.clone()
    }

    /// Get a window by name
    pub fn window(&self, name: &str) -> Option<FakeWindow> {
        self.inner.lock().windows.get(name).cloned()
    }

    /// All sent key data for a window, in order.
    pub fn sent_keys(&self, name: &str) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MuxCall::SendKeys { name: n, data } if n == name => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Set the scrollback lines returned by capture_lines
    pub fn set_scrollback(&self, name: &str, lines: Vec<String>) {
        if let Some(w) = self.inner.lock().windows.get_mut(name) {
            w.scrollback = lines;
        }
    }

    /// Mark a window as dead
    pub fn set_dead(&self, name: &str) {
        if let Some(w) = self.inner.lock().windows.get_mut(name) {
            w.alive = false;
        }
    }

    /// Make subsequent create calls fail
    pub fn fail_create(&self, fail: bool) {
        self.inner.lock().fail_create = fail;
    }
}

#[async_trait]
impl MuxAdapter for FakeMux {
    async fn create(
        &self,
        name: &str,
        cwd: &Path,
        command: &str,
        size: WindowSize,
    ) -> Result<i32, MuxError> {
        let mut inner = self.inner.lock();

        inner.calls.push(MuxCall::Create {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            command: command.to_string(),
            size,
        });

        if inner.fail_create {
            return Err(MuxError::SpawnFailed("fake create failure".to_string()));
        }

        inner.next_pid += 1;
        let pid = inner.next_pid;

        inner.windows.insert(
            name.to_string(),
            FakeWindow {
                name: name.to_string(),
                cwd: cwd.to_path_buf(),
                command: command.to_string(),
                size,
                pid,
                alive: true,
                scrollback: Vec::new(),
            },
        );

        Ok(pid)
    }

    async fn kill(&self, name: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::Kill {
            name: name.to_string(),
        });
        if let Some(w) = inner.windows.get_mut(name) {
            w.alive = false;
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::Exists {
            name: name.to_string(),
        });
        Ok(inner.windows.get(name).map(|w| w.alive).unwrap_or(false))
    }

    async fn rename(&self, old: &str, new: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::Rename {
            old: old.to_string(),
            new: new.to_string(),
        });
        match inner.windows.remove(old) {
            Some(mut w) => {
                w.name = new.to_string();
                inner.windows.insert(new.to_string(), w);
                Ok(())
            }
            None => Err(MuxError::NotFound(old.to_string())),
        }
    }

    async fn send_keys(&self, name: &str, data: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::SendKeys {
            name: name.to_string(),
            data: data.to_string(),
        });
        if !inner.windows.contains_key(name) {
            return Err(MuxError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn capture_lines(&self, name: &str, lines: u32) -> Result<String, MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::CaptureLines {
            name: name.to_string(),
            lines,
        });
        match inner.windows.get(name) {
            Some(w) => {
                let start = w.scrollback.len().saturating_sub(lines as usize);
                Ok(w.scrollback[start..].join("\n"))
            }
            None => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn window_size(&self, name: &str) -> Result<WindowSize, MuxError> {
        let inner = self.inner.lock();
        match inner.windows.get(name) {
            Some(w) => Ok(w.size),
            None => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn resize_window(&self, name: &str, size: WindowSize) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::ResizeWindow {
            name: name.to_string(),
            size,
        });
        match inner.windows.get_mut(name) {
            Some(w) => {
                w.size = size;
                Ok(())
            }
            None => Err(MuxError::NotFound(name.to_string())),
        }
    }

    async fn set_status(&self, name: &str, left: &str, right: &str) -> Result<(), MuxError> {
        let mut inner = self.inner.lock();
        inner.calls.push(MuxCall::SetStatus {
            name: name.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        });
        Ok(())
    }

    async fn pane_pid(&self, name: &str) -> Result<i32, MuxError> {
        let inner = self.inner.lock();
        match inner.windows.get(name) {
            Some(w) => Ok(w.pid),
            None => Err(MuxError::NotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
