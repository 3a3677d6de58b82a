// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process termination and orphan discovery.
//!
//! Dispose kills the pane's process group with a two-phase SIGTERM → grace
//! → SIGKILL policy, then sweeps the workspace for orphaned processes whose
//! working directory lives under the workspace root.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("signal failed for pid {pid}: {message}")]
    Signal { pid: i32, message: String },
}

/// Adapter for killing processes and finding workspace orphans.
#[async_trait]
pub trait ProcessControl: Clone + Send + Sync + 'static {
    /// Two-phase terminate: SIGTERM the process group of `pid` (falling back
    /// to the single process when no group exists), wait up to `grace`, then
    /// SIGKILL whatever survived.
    async fn terminate(&self, pid: i32, grace: Duration) -> Result<(), ProcessError>;

    /// Pids whose current working directory equals `root` or lives under it,
    /// excluding the pids in `skip`.
    async fn orphans_under(&self, root: &Path, skip: &[i32]) -> Vec<i32>;

    /// Liveness probe (signal 0).
    async fn alive(&self, pid: i32) -> bool;
}

/// True when `cwd` is `root` itself or a descendant of it.
///
/// Component-aware comparison, so `/tmp/ws-2` does not match root `/tmp/ws`.
pub fn cwd_within(root: &Path, cwd: &Path) -> bool {
    cwd == root || cwd.starts_with(root)
}

/// Poll interval while waiting out the grace period.
const KILL_POLL: Duration = Duration::from_millis(20);

/// Unix implementation using process-group signals and procfs.
#[derive(Clone, Default)]
pub struct UnixProcesses;

impl UnixProcesses {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    /// What we ended up signaling: the whole group, or just the process.
    #[derive(Clone, Copy, PartialEq)]
    enum KillScope {
        Group,
        Single,
    }

    fn target(scope: KillScope, pid: i32) -> Pid {
        match scope {
            KillScope::Group => Pid::from_raw(-pid),
            KillScope::Single => Pid::from_raw(pid),
        }
    }

    fn probe(scope: KillScope, pid: i32) -> bool {
        kill(target(scope, pid), None).is_ok()
    }

    pub(super) async fn terminate(pid: i32, grace: Duration) -> Result<(), ProcessError> {
        // Negative pid addresses the process group. ESRCH means there is no
        // such group; retry against the single process before giving up.
        let scope = match kill(target(KillScope::Group, pid), Signal::SIGTERM) {
            Ok(()) => KillScope::Group,
            Err(Errno::ESRCH) => match kill(target(KillScope::Single, pid), Signal::SIGTERM) {
                Ok(()) => KillScope::Single,
                Err(Errno::ESRCH) => return Ok(()), // already gone
                Err(e) => {
                    return Err(ProcessError::Signal {
                        pid,
                        message: e.to_string(),
                    })
                }
            },
            Err(e) => {
                return Err(ProcessError::Signal {
                    pid,
                    message: e.to_string(),
                })
            }
        };

        let deadline = std::time::Instant::now() + grace;
        while std::time::Instant::now() < deadline {
            if !probe(scope, pid) {
                return Ok(());
            }
            tokio::time::sleep(KILL_POLL).await;
        }

        if probe(scope, pid) {
            tracing::debug!(pid, "grace expired, escalating to SIGKILL");
            match kill(target(scope, pid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => {
                    return Err(ProcessError::Signal {
                        pid,
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    pub(super) fn alive(pid: i32) -> bool {
        probe(KillScope::Single, pid)
    }
}

/// Scan procfs for processes whose cwd lives under `root`.
///
/// Platforms without /proc yield an empty list; the pane's process-group
/// kill remains the primary cleanup there.
fn scan_orphans(root: &Path, skip: &[i32]) -> Vec<i32> {
    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(error = %e, "procfs unavailable, skipping orphan scan");
            return Vec::new();
        }
    };

    let mut orphans = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        if skip.contains(&pid) || pid == std::process::id() as i32 {
            continue;
        }
        let cwd_link: PathBuf = entry.path().join("cwd");
        let Ok(cwd) = std::fs::read_link(&cwd_link) else {
            continue;
        };
        if cwd_within(root, &cwd) {
            orphans.push(pid);
        }
    }
    orphans.sort_unstable();
    orphans
}

#[async_trait]
impl ProcessControl for UnixProcesses {
    async fn terminate(&self, pid: i32, grace: Duration) -> Result<(), ProcessError> {
        #[cfg(unix)]
        {
            unix_impl::terminate(pid, grace).await
        }
        #[cfg(not(unix))]
        {
            let _ = (pid, grace);
            Ok(())
        }
    }

    async fn orphans_under(&self, root: &Path, skip: &[i32]) -> Vec<i32> {
        let root = root.to_path_buf();
        let skip = skip.to_vec();
        tokio::task::spawn_blocking(move || scan_orphans(&root, &skip))
            .await
            .unwrap_or_default()
    }

    async fn alive(&self, pid: i32) -> bool {
        #[cfg(unix)]
        {
            unix_impl::alive(pid)
        }
        #[cfg(not(unix))]
        {
            let _ = pid;
            false
        }
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    /// Recorded process call
    #[derive(Debug, Clone, PartialEq)]
    pub enum ProcessCall {
        Terminate { pid: i32 },
    }

    struct FakeProcessState {
        live: HashSet<i32>,
        orphans: HashMap<PathBuf, Vec<i32>>,
        calls: Vec<ProcessCall>,
    }

    /// Fake process control for testing
    #[derive(Clone)]
    pub struct FakeProcesses {
        inner: Arc<Mutex<FakeProcessState>>,
    }

    impl Default for FakeProcesses {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeProcessState {
                    live: HashSet::new(),
                    orphans: HashMap::new(),
                    calls: Vec::new(),
                })),
            }
        }
    }

    impl FakeProcesses {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_live(&self, pid: i32) {
            self.inner.lock().live.insert(pid);
        }

        pub fn add_orphan(&self, root: impl Into<PathBuf>, pid: i32) {
            let mut inner = self.inner.lock();
            inner.live.insert(pid);
            inner.orphans.entry(root.into()).or_default().push(pid);
        }

        pub fn calls(&self) -> Vec<ProcessCall> {
            self.inner.lock().calls.clone()
        }

        pub fn terminated_pids(&self) -> Vec<i32> {
            self.inner
                .lock()
                .calls
                .iter()
                .map(|ProcessCall::Terminate { pid }| *pid)
                .collect()
        }
    }

    #[async_trait]
    impl ProcessControl for FakeProcesses {
        async fn terminate(&self, pid: i32, _grace: Duration) -> Result<(), ProcessError> {
            let mut inner = self.inner.lock();
            inner.calls.push(ProcessCall::Terminate { pid });
            inner.live.remove(&pid);
            Ok(())
        }

        async fn orphans_under(&self, root: &Path, skip: &[i32]) -> Vec<i32> {
            let inner = self.inner.lock();
            inner
                .orphans
                .get(root)
                .map(|pids| {
                    pids.iter()
                        .filter(|p| !skip.contains(p) && inner.live.contains(p))
                        .copied()
                        .collect()
                })
                .unwrap_or_default()
        }

        async fn alive(&self, pid: i32) -> bool {
            self.inner.lock().live.contains(&pid)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcesses, ProcessCall};

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
