// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session PTY tracker.
//!
//! One tracker per local session holds a persistent PTY attachment to the
//! session's multiplexer window and fans the byte stream out to (i) the
//! currently attached WebSocket client, (ii) an optional byte callback,
//! and (iii) the signal detector. A supervisor loop reattaches forever
//! until `stop`.

use crate::env;
use crate::signals::stored_nudge_label;
use crate::utf8;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sx_adapters::detect::{
    has_printable, is_terminal_query_response, strip_ansi, SignalDetector, SignalFileWatcher,
    FLUSH_TIMEOUT,
};
use sx_adapters::{MuxAdapter, PtyAttach, PtyError, PtyHandle, WindowSize};
use sx_core::{Session, SessionId, Signal};
use tokio::sync::mpsc;

use crate::error::EngineError;

/// Client channel capacity; chunks are dropped (never reordered) when the
/// browser cannot keep up.
pub const CLIENT_BUFFER: usize = 64;

const READ_BUF: usize = 8 * 1024;

/// Chunks at or below this size with no newline count as activity without
/// further inspection (covers typed-key echo).
const SMALL_CHUNK: usize = 8;

/// Window-size query retries at attach time (startup races).
const SIZE_RETRIES: u32 = 10;
const SIZE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Callbacks out of the tracker into the manager/store layer.
pub struct TrackerHooks {
    /// Debounced activity ping (last-output bookkeeping).
    pub on_activity: Arc<dyn Fn(&SessionId) + Send + Sync>,
    /// Signal pipeline (nudge updates).
    pub on_signal: Arc<dyn Fn(&SessionId, Signal) + Send + Sync>,
    /// Raw byte tap used by the preview autodetector.
    pub on_bytes: Option<Arc<dyn Fn(&SessionId, &[u8]) + Send + Sync>>,
}

/// How the supervisor opens its PTY attachment. Tests substitute a
/// failing attach so the supervisor idles instead of spawning real
/// processes.
pub type AttachFn = Arc<dyn Fn(&str, WindowSize) -> Result<PtyAttach, PtyError> + Send + Sync>;

/// Production attach: `tmux attach-session` under a fresh PTY.
pub fn pty_attach_fn() -> AttachFn {
    Arc::new(|window, size| PtyAttach::open(window, size))
}

struct TrackerInner<M: MuxAdapter> {
    session_id: SessionId,
    mux: M,
    attach: AttachFn,
    window: Mutex<String>,
    pty: Mutex<Option<PtyHandle>>,
    client: Mutex<Option<(u64, mpsc::Sender<Vec<u8>>)>>,
    next_client_token: AtomicU64,
    hooks: TrackerHooks,
    detector: Mutex<SignalDetector>,
    watcher: Mutex<Option<SignalFileWatcher>>,
    stopped: AtomicBool,
    last_activity: Mutex<Option<Instant>>,
    last_chunk: Mutex<Instant>,
    last_retry_log: Mutex<Option<Instant>>,
}

/// Long-lived owner of one PTY attachment to one multiplexer window.
pub struct Tracker<M: MuxAdapter> {
    inner: Arc<TrackerInner<M>>,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
    flusher: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<M: MuxAdapter> Tracker<M> {
    /// Create a tracker for a session and start its supervisor.
    ///
    /// `workspace_path` enables the filesystem signal watcher; on creation
    /// the current on-disk signal is compared against the session's stored
    /// nudge and re-emitted once if they differ, so the UI converges after
    /// a daemon restart.
    pub fn start(
        session: &Session,
        workspace_path: Option<&Path>,
        mux: M,
        attach: AttachFn,
        hooks: TrackerHooks,
    ) -> Arc<Self> {
        let session_id = session.id.clone();

        let detector_session = session_id.clone();
        let detector_hook = Arc::clone(&hooks.on_signal);
        let detector = SignalDetector::new(move |sig| {
            (detector_hook)(&detector_session, sig);
        });

        let inner = Arc::new(TrackerInner {
            session_id: session_id.clone(),
            mux,
            attach,
            window: Mutex::new(session.tmux_session.clone()),
            pty: Mutex::new(None),
            client: Mutex::new(None),
            next_client_token: AtomicU64::new(1),
            hooks,
            detector: Mutex::new(detector),
            watcher: Mutex::new(None),
            stopped: AtomicBool::new(false),
            last_activity: Mutex::new(None),
            last_chunk: Mutex::new(Instant::now()),
            last_retry_log: Mutex::new(None),
        });

        if let Some(root) = workspace_path {
            start_watcher(&inner, root, session);
        }

        let supervisor_inner = Arc::clone(&inner);
        let supervisor = tokio::spawn(async move {
            supervise(supervisor_inner).await;
        });

        let flush_inner = Arc::clone(&inner);
        let flusher = tokio::spawn(async move {
            flush_loop(flush_inner).await;
        });

        Arc::new(Self {
            inner,
            supervisor: Mutex::new(Some(supervisor)),
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// Stop the tracker: kill the attach child, stop the watcher, and wait
    /// for the supervisor to exit. Idempotent.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut handle) = self.inner.pty.lock().take() {
            handle.kill();
        }
        if let Some(watcher) = self.inner.watcher.lock().take() {
            watcher.stop();
        }
        if let Some(flusher) = self.flusher.lock().take() {
            flusher.abort();
        }
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.await;
        }
        tracing::debug!(session_id = %self.inner.session_id, "tracker stopped");
    }

    /// The window this tracker follows.
    pub fn window(&self) -> String {
        self.inner.window.lock().clone()
    }

    /// Point the tracker at a renamed window. The supervisor picks the new
    /// name up on its next (re)attach.
    pub fn set_window(&self, name: &str) {
        *self.inner.window.lock() = name.to_string();
    }

    /// Attach a WebSocket client channel. The previous channel, if any, is
    /// closed first: the latest viewer wins.
    pub fn attach_web_socket(&self) -> (u64, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let token = self.inner.next_client_token.fetch_add(1, Ordering::SeqCst);
        let previous = self.inner.client.lock().replace((token, tx));
        if previous.is_some() {
            tracing::debug!(session_id = %self.inner.session_id, "client handover");
        }
        (token, rx)
    }

    /// Detach a client channel; stale tokens are a no-op.
    pub fn detach_web_socket(&self, token: u64) {
        let mut client = self.inner.client.lock();
        if client.as_ref().is_some_and(|(t, _)| *t == token) {
            *client = None;
        }
    }

    /// Write input to the live PTY; fall back to `send-keys` when no PTY
    /// is attached (or the write fails mid-reattach) so typing is never
    /// silently dropped.
    pub async fn send_input(&self, data: &[u8]) -> Result<(), EngineError> {
        let deadline = Instant::now() + env::input_pty_wait();
        loop {
            let wrote = {
                let mut pty = self.inner.pty.lock();
                pty.as_mut().map(|handle| handle.write(data))
            };
            match wrote {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => {
                    tracing::debug!(session_id = %self.inner.session_id, error = %e, "pty write failed, using send-keys");
                    break;
                }
                None => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }

        let window = self.window();
        let text = String::from_utf8_lossy(data).into_owned();
        self.inner.mux.send_keys(&window, &text).await?;
        Ok(())
    }

    /// Resize the PTY. Fails when no PTY is attached.
    pub fn resize(&self, size: WindowSize) -> Result<(), EngineError> {
        let pty = self.inner.pty.lock();
        match pty.as_ref() {
            Some(handle) => handle.resize(size).map_err(Into::into),
            None => Err(PtyError::NotAttached.into()),
        }
    }

    /// Feed bytes as if read from the PTY. Test seam for the fan-out and
    /// boundary logic.
    #[cfg(any(test, feature = "test-support"))]
    pub fn ingest(&self, chunk: &[u8]) {
        self.inner.consume(chunk);
    }

    /// Tracker without a supervisor loop: fan-out, input fallback and
    /// detector behavior only. Test seam.
    #[cfg(any(test, feature = "test-support"))]
    pub fn detached(session: &Session, mux: M, hooks: TrackerHooks) -> Arc<Self> {
        let detector_session = session.id.clone();
        let detector_hook = Arc::clone(&hooks.on_signal);
        let detector = SignalDetector::new(move |sig| {
            (detector_hook)(&detector_session, sig);
        });
        Arc::new(Self {
            inner: Arc::new(TrackerInner {
                session_id: session.id.clone(),
                mux,
                attach: Arc::new(|_, _| Err(PtyError::NotAttached)),
                window: Mutex::new(session.tmux_session.clone()),
                pty: Mutex::new(None),
                client: Mutex::new(None),
                next_client_token: AtomicU64::new(1),
                hooks,
                detector: Mutex::new(detector),
                watcher: Mutex::new(None),
                stopped: AtomicBool::new(false),
                last_activity: Mutex::new(None),
                last_chunk: Mutex::new(Instant::now()),
                last_retry_log: Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
            flusher: Mutex::new(None),
        })
    }
}

fn start_watcher<M: MuxAdapter>(inner: &Arc<TrackerInner<M>>, root: &Path, session: &Session) {
    let watcher_session = session.id.clone();
    let watcher_hook = Arc::clone(&inner.hooks.on_signal);
    match SignalFileWatcher::start(root, move |sig| {
        (watcher_hook)(&watcher_session, sig);
    }) {
        Ok(watcher) => {
            // Recover state missed while the daemon was down: one callback
            // iff the on-disk signal disagrees with the stored nudge.
            if let Some(current) = watcher.current() {
                let recovered = current.state.nudge_label(&current.message).to_string();
                let stored = stored_nudge_label(session).unwrap_or_else(|| "Working".to_string());
                if recovered != stored {
                    tracing::info!(
                        session_id = %session.id,
                        recovered,
                        stored,
                        "recovered signal state from disk"
                    );
                    (inner.hooks.on_signal)(&session.id, current);
                }
            }
            *inner.watcher.lock() = Some(watcher);
        }
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "signal watcher failed to start");
        }
    }
}

/// Supervisor: verify the window, size the PTY, attach, read until error,
/// reattach after a short delay. Runs until `stop`.
async fn supervise<M: MuxAdapter>(inner: Arc<TrackerInner<M>>) {
    while !inner.stopped.load(Ordering::SeqCst) {
        let window = inner.window.lock().clone();

        match inner.mux.exists(&window).await {
            Ok(true) => {}
            Ok(false) => {
                inner.log_retry(&window, "window missing");
                tokio::time::sleep(sx_adapters::env::reattach_delay()).await;
                continue;
            }
            Err(e) => {
                inner.log_retry(&window, &format!("window check failed: {e}"));
                tokio::time::sleep(sx_adapters::env::reattach_delay()).await;
                continue;
            }
        }

        let Some(size) = query_size(&inner, &window).await else {
            inner.log_retry(&window, "window size unavailable");
            tokio::time::sleep(sx_adapters::env::reattach_delay()).await;
            continue;
        };

        let attach = match (inner.attach)(&window, size) {
            Ok(attach) => attach,
            Err(e) => {
                inner.log_retry(&window, &format!("attach failed: {e}"));
                tokio::time::sleep(sx_adapters::env::reattach_delay()).await;
                continue;
            }
        };

        tracing::debug!(session_id = %inner.session_id, window, "pty attached");
        *inner.pty.lock() = Some(attach.handle);

        let reader = attach.reader;
        let read_inner = Arc::clone(&inner);
        let _ = tokio::task::spawn_blocking(move || read_loop(reader, &read_inner)).await;

        if let Some(mut handle) = inner.pty.lock().take() {
            handle.kill();
        }

        if inner.stopped.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(sx_adapters::env::reattach_delay()).await;
    }
}

async fn query_size<M: MuxAdapter>(
    inner: &Arc<TrackerInner<M>>,
    window: &str,
) -> Option<WindowSize> {
    for _ in 0..SIZE_RETRIES {
        if inner.stopped.load(Ordering::SeqCst) {
            return None;
        }
        match inner.mux.window_size(window).await {
            Ok(size) => return Some(size),
            Err(_) => tokio::time::sleep(SIZE_RETRY_DELAY).await,
        }
    }
    None
}

/// Blocking PTY read loop. Holds back incomplete trailing UTF-8 sequences
/// and releases only whole-codepoint prefixes to consumers.
fn read_loop<M: MuxAdapter>(
    mut reader: Box<dyn std::io::Read + Send>,
    inner: &Arc<TrackerInner<M>>,
) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_BUF];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                let mut chunk = std::mem::take(&mut pending);
                chunk.extend_from_slice(&buf[..n]);
                let complete = utf8::complete_prefix_len(&chunk);
                pending = chunk.split_off(complete);
                if chunk.is_empty() {
                    continue;
                }
                inner.consume(&chunk);
            }
        }
    }
}

/// Idle flush so a status token without a trailing newline still emits.
async fn flush_loop<M: MuxAdapter>(inner: Arc<TrackerInner<M>>) {
    let mut interval = tokio::time::interval(FLUSH_TIMEOUT);
    interval.tick().await; // first tick is immediate
    loop {
        interval.tick().await;
        if inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        if inner.last_chunk.lock().elapsed() >= FLUSH_TIMEOUT {
            inner.detector.lock().flush();
        }
    }
}

impl<M: MuxAdapter> TrackerInner<M> {
    /// Fan a released chunk out to the client, the byte tap, and the
    /// signal detector; update debounced activity.
    fn consume(&self, chunk: &[u8]) {
        {
            let client = self.client.lock();
            if let Some((_, tx)) = client.as_ref() {
                // Non-blocking: drop under pressure, never reorder.
                let _ = tx.try_send(chunk.to_vec());
            }
        }

        if let Some(on_bytes) = &self.hooks.on_bytes {
            (on_bytes)(&self.session_id, chunk);
        }

        self.detector.lock().feed(chunk);
        *self.last_chunk.lock() = Instant::now();

        if chunk_is_meaningful(chunk) {
            self.touch_activity();
        }
    }

    /// Debounced last-output update: at most one per debounce window.
    fn touch_activity(&self) {
        let debounce = env::activity_debounce();
        let mut last = self.last_activity.lock();
        let due = match *last {
            Some(at) => at.elapsed() >= debounce,
            None => true,
        };
        if due {
            *last = Some(Instant::now());
            (self.hooks.on_activity)(&self.session_id);
        }
    }

    fn log_retry(&self, window: &str, reason: &str) {
        let throttle = env::retry_log_throttle();
        let mut last = self.last_retry_log.lock();
        let due = match *last {
            Some(at) => at.elapsed() >= throttle,
            None => true,
        };
        if due {
            *last = Some(Instant::now());
            tracing::warn!(session_id = %self.session_id, window, reason, "tracker retrying");
        }
    }
}

/// Whether a chunk counts as agent activity.
///
/// Terminal query responses never do. Tiny chunks without a newline always
/// do (typed-key echo). Everything else must contain something printable
/// once ANSI is stripped.
fn chunk_is_meaningful(chunk: &[u8]) -> bool {
    if is_terminal_query_response(chunk) {
        return false;
    }
    if chunk.len() <= SMALL_CHUNK && !chunk.contains(&b'\n') {
        return true;
    }
    has_printable(&strip_ansi(chunk))
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
