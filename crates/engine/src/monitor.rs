// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote signal monitor.
//!
//! One monitor per remote session subscribes to the connection's per-pane
//! output channel and feeds the signal detector. On every (re)connect the
//! monitor replays up to 200 lines of scrollback in suppressed mode to
//! learn the current state without re-emitting history, then emits once if
//! that state disagrees with the session's stored nudge. The monitor
//! retries forever until stopped; it never surfaces an error to the
//! manager.

use std::sync::Arc;
use std::time::Duration;
use sx_adapters::detect::{SignalDetector, FLUSH_TIMEOUT};
use sx_adapters::remote::RemoteConnection;
use sx_core::{Signal, SessionId};
use tokio::sync::oneshot;

/// Scrollback replayed for state recovery after reconnect.
const RECOVERY_LINES: u32 = 200;

/// Delay between reconnection probes while the channel is down.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Callbacks out of the monitor.
pub struct MonitorHooks {
    /// Signal pipeline (same policy as the tracker's).
    pub on_signal: Arc<dyn Fn(&SessionId, Signal) + Send + Sync>,
    /// Current stored nudge label for the session, consulted during
    /// recovery ("Working" when none).
    pub stored_label: Arc<dyn Fn() -> Option<String> + Send + Sync>,
}

/// Handle to a running remote signal monitor.
pub struct RemoteMonitor {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl RemoteMonitor {
    /// Start monitoring one remote pane.
    pub fn start(
        conn: RemoteConnection,
        session_id: SessionId,
        pane_id: String,
        hooks: MonitorHooks,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            monitor_loop(conn, session_id, pane_id, hooks, stop_rx).await;
        });
        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Close the stop channel and wait for the monitor to exit.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let _ = self.handle.await;
    }
}

async fn monitor_loop(
    conn: RemoteConnection,
    session_id: SessionId,
    pane_id: String,
    hooks: MonitorHooks,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let emit_session = session_id.clone();
    let emit_hook = Arc::clone(&hooks.on_signal);
    let mut detector = SignalDetector::new(move |sig| {
        (emit_hook)(&emit_session, sig);
    });

    loop {
        if !conn.is_connected() {
            tokio::select! {
                _ = tokio::time::sleep(RETRY_DELAY) => continue,
                _ = &mut stop_rx => return,
            }
        }

        recover_state(&conn, &pane_id, &mut detector, &hooks, &session_id).await;

        let (token, mut rx) = conn.subscribe_output(&pane_id);
        let mut flush_tick = tokio::time::interval(FLUSH_TIMEOUT);
        flush_tick.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => detector.feed(event.data.as_bytes()),
                        None => {
                            // Channel closed: the control channel dropped.
                            // Resubscribe after the next successful connect.
                            tracing::debug!(session_id = %session_id, pane_id, "pane channel closed, will resubscribe");
                            break;
                        }
                    }
                }
                _ = flush_tick.tick() => {
                    detector.flush();
                }
                _ = &mut stop_rx => {
                    conn.unsubscribe_output(&pane_id, token);
                    return;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RETRY_DELAY) => {}
            _ = &mut stop_rx => return,
        }
    }
}

/// Replay scrollback suppressed, flush, then emit once iff the learned
/// state disagrees with the stored nudge.
async fn recover_state(
    conn: &RemoteConnection,
    pane_id: &str,
    detector: &mut SignalDetector,
    hooks: &MonitorHooks,
    session_id: &SessionId,
) {
    detector.suppress(true);
    match conn.capture_pane_lines(pane_id, RECOVERY_LINES).await {
        Ok(capture) => {
            detector.feed(capture.as_bytes());
            detector.flush();
        }
        Err(e) => {
            tracing::debug!(session_id = %session_id, pane_id, error = %e, "recovery capture failed");
        }
    }
    detector.suppress(false);

    if let Some(last) = detector.last_signal() {
        let recovered = last.state.nudge_label(&last.message).to_string();
        let stored = (hooks.stored_label)().unwrap_or_else(|| "Working".to_string());
        if recovered != stored {
            tracing::info!(session_id = %session_id, recovered, stored, "remote state recovered");
            (hooks.on_signal)(session_id, last.clone());
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
