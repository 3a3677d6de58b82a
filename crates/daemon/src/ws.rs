// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal WebSocket bridge.
//!
//! One browser client per connection, one multiplexer window per client.
//! The bridge bootstraps with a scrollback snapshot, then relays a
//! per-client PTY attach (local) or the pane's control-mode output
//! (remote) as `append` messages. Input and resize flow back through the
//! multiplexer. Writes block on the socket; a slow client back-pressures
//! the PTY reader through the bounded relay channel.

use crate::api::authorize;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::time::Duration;
use sx_adapters::detect::is_terminal_query_response;
use sx_adapters::{MuxAdapter, ProcessControl, PtyAttach, PtyHandle, WindowSize};
use sx_core::Session;
use tokio::sync::mpsc;

/// Scrollback lines captured for the bootstrap snapshot.
const BOOTSTRAP_LINES: u32 = 200;

/// Liveness check interval.
const LIVENESS_TICK: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct ResizePayload {
    cols: i32,
    rows: i32,
}

/// GET /ws/terminal/{session_id}
pub async fn terminal_handler<M: MuxAdapter, P: ProcessControl>(
    State(state): State<AppState<M, P>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if authorize(&state, &headers).is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    // Dead or unknown sessions never upgrade.
    if !state.manager.is_running(&session_id) {
        return StatusCode::GONE.into_response();
    }
    ws.on_upgrade(move |socket| async move {
        handle_terminal(socket, state, session_id).await;
    })
}

async fn handle_terminal<M: MuxAdapter, P: ProcessControl>(
    mut socket: WebSocket,
    state: AppState<M, P>,
    session_id: String,
) {
    let Ok(session) = state.manager.get_session(&session_id) else {
        return;
    };
    let window = session.tmux_session.clone();
    state.clients.register(&session_id);
    tracing::info!(session_id, window, "terminal client connected");

    // Bootstrap snapshot so the browser has content before live bytes.
    match bootstrap_capture(&state, &session, &window).await {
        Ok(capture) => {
            let payload = serde_json::json!({
                "type": "full",
                "content": filter_terminal_modes(&capture),
            });
            if socket.send(Message::Text(payload.to_string())).await.is_err() {
                state.clients.unregister(&session_id);
                return;
            }
        }
        Err(e) => {
            tracing::warn!(session_id, error = %e, "bootstrap capture failed");
        }
    }

    // Status bar styling is idempotent; reapplying on every connect is
    // fine. Remote windows live on the remote server, not the local one.
    if !session.is_remote() {
        let _ = state
            .manager
            .mux()
            .set_status(&window, &session.target, "%H:%M %d-%b-%y")
            .await;
    }

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Vec<u8>>(1);
    let mut pty = attach_output(&state, &session, &window, chunk_tx).await;

    let mut liveness = tokio::time::interval(LIVENESS_TICK);
    liveness.tick().await;

    loop {
        tokio::select! {
            chunk = chunk_rx.recv() => {
                match chunk {
                    Some(chunk) => {
                        let payload = serde_json::json!({
                            "type": "append",
                            "content": filter_terminal_modes(&String::from_utf8_lossy(&chunk)),
                        });
                        if socket.send(Message::Text(payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, &session, &window, &mut pty, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames ignored
                    Some(Err(e)) => {
                        tracing::debug!(session_id, error = %e, "websocket recv error");
                        break;
                    }
                }
            }

            _ = liveness.tick() => {
                if !state.manager.is_running(&session_id) {
                    let payload = serde_json::json!({
                        "type": "append",
                        "content": "\r\nSession ended\r\n",
                    });
                    let _ = socket.send(Message::Text(payload.to_string())).await;
                    break;
                }
            }
        }
    }

    if let Some(mut handle) = pty {
        handle.kill();
    }
    state.clients.unregister(&session_id);
    tracing::info!(session_id, "terminal client disconnected");
}

/// Scrollback snapshot for the bootstrap message: the local multiplexer
/// for local sessions, the pane's control-channel capture for remote ones
/// (the remote window does not exist on the local tmux server).
async fn bootstrap_capture<M: MuxAdapter, P: ProcessControl>(
    state: &AppState<M, P>,
    session: &Session,
    window: &str,
) -> Result<String, String> {
    if session.is_remote() {
        let conn = state
            .manager
            .connection_for_host(&session.remote_host_id)
            .await
            .ok_or_else(|| "no control connection for host".to_string())?;
        return conn
            .capture_pane_lines(&session.remote_pane_id, BOOTSTRAP_LINES)
            .await
            .map_err(|e| e.to_string());
    }
    state
        .manager
        .mux()
        .capture_lines(window, BOOTSTRAP_LINES)
        .await
        .map_err(|e| e.to_string())
}

/// Wire the output source into the relay channel: a dedicated PTY attach
/// for local sessions, the pane's control-mode subscription for remote
/// ones. Returns the PTY handle for resize/cleanup.
async fn attach_output<M: MuxAdapter, P: ProcessControl>(
    state: &AppState<M, P>,
    session: &Session,
    window: &str,
    chunk_tx: mpsc::Sender<Vec<u8>>,
) -> Option<PtyHandle> {
    if session.is_remote() {
        let Some(conn) = state
            .manager
            .connection_for_host(&session.remote_host_id)
            .await
        else {
            tracing::warn!(session_id = %session.id, "no control connection for remote terminal");
            return None;
        };
        let pane = session.remote_pane_id.clone();
        let (token, mut rx) = conn.subscribe_output(&pane);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if chunk_tx.send(event.data.into_bytes()).await.is_err() {
                    break;
                }
            }
            conn.unsubscribe_output(&pane, token);
        });
        return None;
    }

    let size = WindowSize {
        cols: state.manager.config().terminal.columns,
        rows: state.manager.config().terminal.rows,
    };
    match PtyAttach::open(window, size) {
        Ok(attach) => {
            let mut reader = attach.reader;
            tokio::task::spawn_blocking(move || {
                let mut buf = [0u8; 8 * 1024];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            // Blocking send: socket backpressure reaches the
                            // PTY reader.
                            if chunk_tx.blocking_send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
            Some(attach.handle)
        }
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "terminal pty attach failed, using tracker stream");
            // Fall back to the tracker's client channel (latest viewer
            // wins) so the browser still gets live output.
            if let Some(tracker) = state.manager.tracker(session.id.as_str()) {
                let (token, mut rx) = tracker.attach_web_socket();
                tokio::spawn(async move {
                    while let Some(chunk) = rx.recv().await {
                        if chunk_tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                    tracker.detach_web_socket(token);
                });
            }
            None
        }
    }
}

/// Handle one client JSON message. Input and resize failures are logged,
/// never fatal to the connection.
async fn handle_client_message<M: MuxAdapter, P: ProcessControl>(
    state: &AppState<M, P>,
    session: &Session,
    window: &str,
    pty: &mut Option<PtyHandle>,
    text: &str,
) {
    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        tracing::debug!(session_id = %session.id, "unparseable client message");
        return;
    };

    match msg.kind.as_str() {
        "input" => {
            // Terminal query responses are terminal chatter, not typing.
            if is_terminal_query_response(msg.data.as_bytes()) {
                return;
            }

            // Interacting with a nudged session acknowledges the nudge.
            if clears_nudge(&msg.data) {
                let current = state.manager.store().get_session(session.id.as_str());
                if current.and_then(|s| s.nudge).is_some() {
                    let store = state.manager.store();
                    if store
                        .update_session_nudge(session.id.as_str(), None)
                        .is_ok()
                    {
                        let _ = store.save();
                    }
                }
            }

            if session.is_remote() {
                if let Some(conn) = state
                    .manager
                    .connection_for_host(&session.remote_host_id)
                    .await
                {
                    let _ = conn.send_keys(&session.remote_pane_id, &msg.data).await;
                }
            } else if let Err(e) = state.manager.mux().send_keys(window, &msg.data).await {
                tracing::warn!(session_id = %session.id, error = %e, "input forward failed");
            }
        }
        "resize" => {
            let Some(size) = parse_resize(&msg.data) else {
                tracing::debug!(session_id = %session.id, data = %msg.data, "invalid resize payload");
                return;
            };
            if let Err(e) = state.manager.mux().resize_window(window, size).await {
                tracing::warn!(session_id = %session.id, error = %e, "window resize failed");
            }
            if let Some(handle) = pty {
                if let Err(e) = handle.resize(size) {
                    tracing::warn!(session_id = %session.id, error = %e, "pty resize failed");
                }
            }
        }
        other => {
            tracing::debug!(session_id = %session.id, kind = other, "unknown client message type");
        }
    }
}

/// Enter, Tab and Shift-Tab acknowledge a pending nudge.
fn clears_nudge(data: &str) -> bool {
    data.contains('\r') || data.contains('\t') || data.contains("\x1b[Z")
}

/// Parse the resize payload: a JSON-encoded string `{cols, rows}` with
/// positive dimensions.
fn parse_resize(data: &str) -> Option<WindowSize> {
    let payload: ResizePayload = serde_json::from_str(data).ok()?;
    if payload.cols <= 0 || payload.rows <= 0 {
        return None;
    }
    Some(WindowSize {
        cols: u16::try_from(payload.cols).ok()?,
        rows: u16::try_from(payload.rows).ok()?,
    })
}

/// Terminal-mode escapes that would fight the browser terminal's own
/// scrollback handling: mouse tracking modes and the alternate screen.
const FILTERED_MODES: [&str; 14] = [
    "\x1b[?1000h", "\x1b[?1000l", "\x1b[?1002h", "\x1b[?1002l", "\x1b[?1003h", "\x1b[?1003l",
    "\x1b[?1005h", "\x1b[?1005l", "\x1b[?1006h", "\x1b[?1006l", "\x1b[?1015h", "\x1b[?1015l",
    "\x1b[?1049h", "\x1b[?47h",
];

/// Strip mouse-mode and alternate-screen switches so the browser terminal
/// keeps scrollback local.
pub fn filter_terminal_modes(content: &str) -> String {
    let mut out = content.to_string();
    for mode in FILTERED_MODES {
        if out.contains(mode) {
            out = out.replace(mode, "");
        }
    }
    out
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
