// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! sx-daemon: HTTP/WebSocket surface over the session engine.
//!
//! The daemon binary (`schmuxd`) wires the tmux and process adapters into
//! the session manager and serves the dashboard's session API plus the
//! terminal WebSocket bridge.

pub mod api;
pub mod env;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use sx_adapters::{MuxAdapter, ProcessControl};
use sx_engine::SessionManager;
use tower_http::trace::TraceLayer;

/// Server-wide count of live terminal clients per session.
#[derive(Default)]
pub struct ClientRegistry {
    counts: Mutex<HashMap<String, usize>>,
}

impl ClientRegistry {
    pub fn register(&self, session_id: &str) {
        *self.counts.lock().entry(session_id.to_string()).or_insert(0) += 1;
    }

    pub fn unregister(&self, session_id: &str) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(session_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(session_id);
            }
        }
    }

    /// Live terminal clients for a session.
    pub fn viewers(&self, session_id: &str) -> usize {
        self.counts.lock().get(session_id).copied().unwrap_or(0)
    }
}

/// Shared handler state.
pub struct AppState<M: MuxAdapter, P: ProcessControl> {
    pub manager: Arc<SessionManager<M, P>>,
    pub clients: Arc<ClientRegistry>,
}

impl<M: MuxAdapter, P: ProcessControl> Clone for AppState<M, P> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            clients: Arc::clone(&self.clients),
        }
    }
}

impl<M: MuxAdapter, P: ProcessControl> AppState<M, P> {
    pub fn new(manager: Arc<SessionManager<M, P>>) -> Self {
        Self {
            manager,
            clients: Arc::new(ClientRegistry::default()),
        }
    }
}

/// Build the daemon router.
pub fn router<M: MuxAdapter, P: ProcessControl>(state: AppState<M, P>) -> Router {
    Router::new()
        .route("/api/sessions", get(api::list_sessions).post(api::spawn_sessions))
        .route("/api/sessions/:id/dispose", post(api::dispose_session))
        .route("/api/sessions/:id/rename", post(api::rename_session))
        .route("/api/workspaces/:id/dispose", post(api::dispose_workspace))
        .route("/api/workspaces/dispose-all", post(api::dispose_all_workspaces))
        .route("/ws/terminal/:session_id", get(ws::terminal_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
