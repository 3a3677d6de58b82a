// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent control-mode connection to one remote host.
//!
//! Concurrency contract:
//! - exactly one reader task parses frames and dispatches pane output;
//! - command writers serialize on the stdin lock, and the pending deque is
//!   pushed under that same lock so FIFO reply correlation holds;
//! - subscriber add/remove uses its own lock, the reader takes it read-side;
//! - queued spawns use a third lock and drain in insertion order when the
//!   channel comes up.

use super::control::{decode_octal_escapes, parse_control_line, quote_arg, ControlLine};
use super::{OutputEvent, RemoteError};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sx_core::{Flavor, Host, HostId, HostStatus};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

/// Control session name on the remote host. `new-session -A` makes
/// reconnects attach instead of erroring.
const CONTROL_SESSION: &str = "schmux-agents";

/// Control-mode invocation appended to every connect/reconnect command.
const CONTROL_ARGS: &str = "tmux -C new-session -A -s";

/// Per-pane subscriber channel capacity; slow subscribers drop output.
const SUBSCRIBER_BUFFER: usize = 64;

/// How long to wait for the hostname line on the channel's stderr.
const HOSTNAME_WAIT: Duration = Duration::from_secs(2);

/// Result channel handed out by [`RemoteConnection::queue_session`].
pub type QueueResult = oneshot::Receiver<Result<(String, String), RemoteError>>;

struct PendingCommand {
    tx: oneshot::Sender<CommandResponse>,
    output: String,
}

#[derive(Debug)]
struct CommandResponse {
    success: bool,
    output: String,
}

struct QueuedSpawn {
    session_id: String,
    window_name: String,
    cwd: String,
    command: String,
    result_tx: oneshot::Sender<Result<(String, String), RemoteError>>,
}

type Subscriber = (u64, mpsc::Sender<OutputEvent>);

struct ConnInner {
    flavor: Flavor,
    host: Mutex<Host>,
    connected: AtomicBool,
    /// Writable half of the control channel. Pending pushes happen under
    /// this lock so deque order matches stdin write order.
    stdin: tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    pending: Mutex<VecDeque<PendingCommand>>,
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_token: AtomicU64,
    queue: Mutex<VecDeque<QueuedSpawn>>,
    child: Mutex<Option<tokio::process::Child>>,
    reply_timeout: Duration,
}

/// A control-mode connection to one remote host, shared by every session
/// on that host.
#[derive(Clone)]
pub struct RemoteConnection {
    inner: Arc<ConnInner>,
}

impl RemoteConnection {
    /// Open the control channel for a flavor: run the connect template,
    /// extract the hostname, provision the host on first use, and verify
    /// the channel end to end.
    pub async fn connect(flavor: Flavor, reply_timeout: Duration) -> Result<Self, RemoteError> {
        let host = Host {
            id: HostId::new(format!("{}-{}", flavor.id, sx_core::short_uuid())),
            flavor_id: flavor.id.clone(),
            hostname: String::new(),
            uuid: uuid::Uuid::new_v4().to_string(),
            connected_at: None,
            expires_at: None,
            status: HostStatus::Provisioning,
            provisioned: false,
        };
        let conn = Self::detached(flavor, host, reply_timeout);

        conn.provision().await?;
        conn.open_channel(conn.inner.flavor.expand_connect()).await?;
        conn.health_check().await?;
        conn.mark_connected().await;
        Ok(conn)
    }

    /// Re-run the connect flow against a known hostname. The subscriber set
    /// is left untouched; subscribers whose channels were closed by a prior
    /// teardown re-subscribe on their own schedule.
    pub async fn reconnect(&self) -> Result<(), RemoteError> {
        let hostname = {
            let mut host = self.inner.host.lock();
            host.status = HostStatus::Reconnecting;
            host.hostname.clone()
        };
        let command = self.inner.flavor.expand_reconnect(&hostname);
        self.close_child().await;
        self.open_channel(command).await?;
        self.health_check().await?;
        self.mark_connected().await;
        Ok(())
    }

    /// Build a connection without any channel, for the connect path and for
    /// tests that drive the protocol through in-memory streams.
    pub fn detached(flavor: Flavor, host: Host, reply_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                flavor,
                host: Mutex::new(host),
                connected: AtomicBool::new(false),
                stdin: tokio::sync::Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
                subscribers: RwLock::new(HashMap::new()),
                next_token: AtomicU64::new(1),
                queue: Mutex::new(VecDeque::new()),
                child: Mutex::new(None),
                reply_timeout,
            }),
        }
    }

    /// Wire an already-open stream pair as the control channel and start
    /// the reader. Used by `connect` and by protocol tests.
    pub async fn attach_streams(
        &self,
        stdin: impl AsyncWrite + Send + Unpin + 'static,
        stdout: impl AsyncRead + Send + Unpin + 'static,
    ) {
        *self.inner.stdin.lock().await = Some(Box::new(stdin));
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            reader_loop(inner, stdout).await;
        });
    }

    /// Mark the channel connected and drain queued spawns in FIFO order.
    pub async fn mark_connected(&self) {
        self.inner.connected.store(true, Ordering::SeqCst);
        {
            let mut host = self.inner.host.lock();
            host.status = HostStatus::Connected;
            host.connected_at = Some(Utc::now());
        }
        self.drain_queue().await;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Snapshot of the host record.
    pub fn host(&self) -> Host {
        self.inner.host.lock().clone()
    }

    pub fn flavor(&self) -> &Flavor {
        &self.inner.flavor
    }

    /// Create a remote window and return `(window_id, pane_id)`.
    pub async fn create_session(
        &self,
        window_name: &str,
        cwd: &str,
        command: &str,
    ) -> Result<(String, String), RemoteError> {
        let cmd = format!(
            "new-window -d -P -F \"#{{window_id}} #{{pane_id}}\" -n {} -c {} {}",
            quote_arg(window_name),
            quote_arg(cwd),
            quote_arg(command),
        );
        let resp = self.send_command(&cmd).await?;
        if !resp.success {
            return Err(RemoteError::CommandFailed(resp.output));
        }
        let line = resp.output.lines().next().unwrap_or_default();
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(window), Some(pane)) if window.starts_with('@') && pane.starts_with('%') => {
                Ok((window.to_string(), pane.to_string()))
            }
            _ => Err(RemoteError::Parse(line.to_string())),
        }
    }

    /// Queue a spawn for execution when the channel connects. The result is
    /// delivered exactly once on the returned channel.
    pub fn queue_session(
        &self,
        session_id: &str,
        window_name: &str,
        cwd: &str,
        command: &str,
    ) -> QueueResult {
        let (result_tx, result_rx) = oneshot::channel();
        self.inner.queue.lock().push_back(QueuedSpawn {
            session_id: session_id.to_string(),
            window_name: window_name.to_string(),
            cwd: cwd.to_string(),
            command: command.to_string(),
            result_tx,
        });
        tracing::info!(session_id, window_name, "queued remote spawn");
        result_rx
    }

    /// Subscribe to a pane's output. Returns a token for unsubscribe and
    /// the receiving channel. All subscribers of a pane receive a copy;
    /// slow ones drop chunks rather than blocking the reader.
    pub fn subscribe_output(&self, pane_id: &str) -> (u64, mpsc::Receiver<OutputEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        self.inner
            .subscribers
            .write()
            .entry(pane_id.to_string())
            .or_default()
            .push((token, tx));
        (token, rx)
    }

    /// Remove one subscriber. Unknown tokens are a no-op.
    pub fn unsubscribe_output(&self, pane_id: &str, token: u64) {
        let mut subscribers = self.inner.subscribers.write();
        if let Some(list) = subscribers.get_mut(pane_id) {
            list.retain(|(t, _)| *t != token);
            if list.is_empty() {
                subscribers.remove(pane_id);
            }
        }
    }

    /// Last `n` lines of a pane's scrollback.
    pub async fn capture_pane_lines(&self, pane_id: &str, n: u32) -> Result<String, RemoteError> {
        let cmd = format!("capture-pane -t {} -p -S -{}", pane_id, n);
        let resp = self.send_command(&cmd).await?;
        if !resp.success {
            return Err(RemoteError::CommandFailed(resp.output));
        }
        Ok(decode_octal_escapes(&resp.output))
    }

    /// Kill a remote window.
    pub async fn kill_session(&self, window_id: &str) -> Result<(), RemoteError> {
        let resp = self
            .send_command(&format!("kill-window -t {}", window_id))
            .await?;
        if !resp.success {
            return Err(RemoteError::CommandFailed(resp.output));
        }
        Ok(())
    }

    /// Send literal keystrokes to a remote pane.
    pub async fn send_keys(&self, pane_id: &str, data: &str) -> Result<(), RemoteError> {
        let resp = self
            .send_command(&format!("send-keys -t {} -l {}", pane_id, quote_arg(data)))
            .await?;
        if !resp.success {
            return Err(RemoteError::CommandFailed(resp.output));
        }
        Ok(())
    }

    /// Shut down the channel and fail everything in flight.
    pub async fn shutdown(&self) {
        self.close_child().await;
        teardown(&self.inner);
    }

    // ── internals ───────────────────────────────────────────────────

    /// Run the flavor's provision command once per host. Exit 0 marks the
    /// host provisioned; failures are fatal for connect.
    async fn provision(&self) -> Result<(), RemoteError> {
        let provisioned = self.inner.host.lock().provisioned;
        let Some(provision) = self.inner.flavor.expand_provision() else {
            return Ok(());
        };
        if provisioned {
            return Ok(());
        }
        let full = format!("{} {}", self.inner.flavor.expand_connect(), provision);
        tracing::info!(flavor = %self.inner.flavor.id, command = %full, "provisioning remote host");
        let output = Command::new("sh")
            .args(["-c", &full])
            .output()
            .await
            .map_err(|e| RemoteError::SpawnFailed(e.to_string()))?;
        if output.status.success() {
            self.inner.host.lock().provisioned = true;
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            self.inner.host.lock().status = HostStatus::Disconnected;
            Err(RemoteError::SpawnFailed(format!(
                "provision failed: {stderr}"
            )))
        }
    }

    /// Spawn the control child for `connect_command` and wire its pipes.
    async fn open_channel(&self, connect_command: String) -> Result<(), RemoteError> {
        self.inner.host.lock().status = HostStatus::Connecting;
        let full = format!("{connect_command} {CONTROL_ARGS} {CONTROL_SESSION}");
        tracing::info!(flavor = %self.inner.flavor.id, command = %full, "opening control channel");

        let mut child = Command::new("sh")
            .args(["-c", &full])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.inner.host.lock().status = HostStatus::Disconnected;
                RemoteError::SpawnFailed(e.to_string())
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            RemoteError::SpawnFailed("control child has no stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            RemoteError::SpawnFailed("control child has no stdout".to_string())
        })?;
        if let Some(stderr) = child.stderr.take() {
            self.watch_stderr(stderr);
        }

        *self.inner.child.lock() = Some(child);
        self.attach_streams(stdin, stdout).await;

        // The hostname line usually arrives within the ControlMaster
        // handshake; wait briefly but do not fail without it.
        let deadline = tokio::time::Instant::now() + HOSTNAME_WAIT;
        while tokio::time::Instant::now() < deadline {
            if !self.inner.host.lock().hostname.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    /// Scan the channel's stderr for the flavor's hostname pattern.
    fn watch_stderr(&self, stderr: tokio::process::ChildStderr) {
        let pattern = self.inner.flavor.hostname_regex.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let regex = match Regex::new(&pattern) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "invalid hostname regex");
                    return;
                }
            };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(captures) = regex.captures(&line) {
                    if let Some(hostname) = captures.get(1) {
                        let mut host = inner.host.lock();
                        if host.hostname.is_empty() {
                            host.hostname = hostname.as_str().to_string();
                            tracing::info!(hostname = %host.hostname, "remote hostname discovered");
                        }
                    }
                }
            }
        });
    }

    /// Round-trip probe verifying the reply path end to end.
    async fn health_check(&self) -> Result<(), RemoteError> {
        let resp = self.send_raw_command("display-message -p ok").await?;
        if resp.success {
            Ok(())
        } else {
            self.inner.host.lock().status = HostStatus::Disconnected;
            Err(RemoteError::CommandFailed(resp.output))
        }
    }

    /// Send a command requiring the connected flag.
    async fn send_command(&self, cmd: &str) -> Result<CommandResponse, RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::NotConnected);
        }
        self.send_raw_command(cmd).await
    }

    /// Send a command regardless of the connected flag (health check runs
    /// before the flag is set).
    async fn send_raw_command(&self, cmd: &str) -> Result<CommandResponse, RemoteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.inner.stdin.lock().await;
            let Some(stdin) = guard.as_mut() else {
                return Err(RemoteError::NotConnected);
            };
            // Push-then-write under the stdin lock keeps deque order in
            // sync with the write order.
            self.inner.pending.lock().push_back(PendingCommand {
                tx,
                output: String::new(),
            });
            if let Err(e) = stdin.write_all(format!("{cmd}\n").as_bytes()).await {
                tracing::debug!(error = %e, "control channel write failed");
                self.inner.pending.lock().pop_back();
                return Err(RemoteError::ChannelClosed);
            }
            let _ = stdin.flush().await;
        }

        match tokio::time::timeout(self.inner.reply_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(RemoteError::ChannelClosed),
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    async fn drain_queue(&self) {
        loop {
            let spawn = self.inner.queue.lock().pop_front();
            let Some(spawn) = spawn else { break };
            tracing::info!(
                session_id = %spawn.session_id,
                window = %spawn.window_name,
                "draining queued remote spawn"
            );
            let result = self
                .create_session(&spawn.window_name, &spawn.cwd, &spawn.command)
                .await;
            let _ = spawn.result_tx.send(result);
        }
    }

    async fn close_child(&self) {
        let child = self.inner.child.lock().take();
        if let Some(mut child) = child {
            let _ = child.kill().await;
        }
    }
}

/// Single reader over the control channel. Dispatches `%output` frames to
/// subscribers and correlates replies FIFO with the pending deque.
async fn reader_loop(inner: Arc<ConnInner>, stdout: impl AsyncRead + Unpin) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    let mut active: Option<PendingCommand> = None;

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                match parse_control_line(trimmed) {
                    ControlLine::Begin => {
                        // Pop the next pending command. If none (e.g. the
                        // initial new-session reply), the block is discarded.
                        active = inner.pending.lock().pop_front();
                    }
                    ControlLine::Data(data) => {
                        if let Some(cmd) = &mut active {
                            if !cmd.output.is_empty() {
                                cmd.output.push('\n');
                            }
                            cmd.output.push_str(&data);
                        }
                    }
                    ControlLine::End => {
                        if let Some(cmd) = active.take() {
                            let _ = cmd.tx.send(CommandResponse {
                                success: true,
                                output: cmd.output,
                            });
                        }
                    }
                    ControlLine::Error => {
                        if let Some(cmd) = active.take() {
                            let _ = cmd.tx.send(CommandResponse {
                                success: false,
                                output: cmd.output,
                            });
                        }
                    }
                    ControlLine::Output { pane_id, data } => {
                        let subscribers = inner.subscribers.read();
                        if let Some(list) = subscribers.get(&pane_id) {
                            for (_, tx) in list {
                                // Non-blocking: a slow subscriber drops
                                // output rather than stalling the reader.
                                let _ = tx.try_send(OutputEvent {
                                    pane_id: pane_id.clone(),
                                    data: data.clone(),
                                });
                            }
                        }
                    }
                    ControlLine::Notification(_) => {}
                }
            }
            Err(_) => break,
        }
    }

    if let Some(cmd) = active.take() {
        let _ = cmd.tx.send(CommandResponse {
            success: false,
            output: "control channel disconnected".to_string(),
        });
    }
    teardown(&inner);
}

/// Transition to disconnected: fail pending commands and close every pane
/// channel so subscribers observe the drop.
fn teardown(inner: &ConnInner) {
    inner.connected.store(false, Ordering::SeqCst);
    inner.host.lock().status = HostStatus::Disconnected;

    let mut pending = inner.pending.lock();
    for cmd in pending.drain(..) {
        let _ = cmd.tx.send(CommandResponse {
            success: false,
            output: "control channel disconnected".to_string(),
        });
    }
    drop(pending);

    // Dropping the senders closes the receivers.
    inner.subscribers.write().clear();
    tracing::info!("control channel torn down");
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
