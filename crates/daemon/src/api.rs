// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session API handlers.

use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use sx_adapters::{MuxAdapter, ProcessControl};
use sx_engine::{EngineError, SpawnRequest, WorkspaceSelector};

/// API error: an engine error plus its HTTP mapping.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "missing or invalid token".to_string(),
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = if e.is_not_found() {
            StatusCode::NOT_FOUND
        } else if e.is_validation() {
            StatusCode::BAD_REQUEST
        } else if e.is_conflict() {
            StatusCode::CONFLICT
        } else if e.is_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Bearer-token check; a daemon without a configured token is open.
pub(crate) fn authorize<M: MuxAdapter, P: ProcessControl>(
    state: &AppState<M, P>,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let Some(token) = &state.manager.config().auth_token else {
        return Ok(());
    };
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(token.as_str()) {
        Ok(())
    } else {
        Err(ApiError::unauthorized())
    }
}

/// Spawn request body. `targets` (name → instance count) and `command`
/// are mutually exclusive.
#[derive(Debug, Default, Deserialize)]
pub struct SpawnBody {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub targets: BTreeMap<String, u32>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub quick_launch_name: String,
    #[serde(default)]
    pub resume: bool,
    #[serde(default)]
    pub remote_flavor_id: String,
    #[serde(default)]
    pub new_branch: String,
}

/// One element per requested target instance.
#[derive(Debug, Serialize)]
pub struct SpawnResult {
    pub session_id: String,
    pub workspace_id: String,
    pub target: String,
    pub command: String,
    pub prompt: String,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpawnResult {
    fn failure(target: &str, prompt: &str, nickname: &str, error: String) -> Self {
        Self {
            session_id: String::new(),
            workspace_id: String::new(),
            target: target.to_string(),
            command: String::new(),
            prompt: prompt.to_string(),
            nickname: nickname.to_string(),
            error: Some(error),
        }
    }
}

fn selector(body: &SpawnBody) -> Result<WorkspaceSelector, ApiError> {
    if !body.workspace_id.is_empty() {
        return Ok(WorkspaceSelector::Id(body.workspace_id.clone()));
    }
    if body.repo.is_empty() || body.branch.is_empty() {
        return Err(ApiError::validation(
            "either workspace_id or repo+branch is required",
        ));
    }
    Ok(WorkspaceSelector::RepoBranch {
        repo: body.repo.clone(),
        branch: body.branch.clone(),
        new_branch: if body.new_branch.is_empty() {
            None
        } else {
            Some(body.new_branch.clone())
        },
    })
}

/// Target instances requested by the body: the targets map, a quick-launch
/// name (an alias for one user target), or one raw command.
fn requested_instances(body: &SpawnBody) -> Result<Vec<(String, Option<String>)>, ApiError> {
    let has_targets = !body.targets.is_empty() || !body.quick_launch_name.is_empty();
    let has_command = !body.command.is_empty();
    if has_targets == has_command {
        return Err(ApiError::validation(
            "exactly one of targets or command is required",
        ));
    }

    if has_command {
        return Ok(vec![("command".to_string(), Some(body.command.clone()))]);
    }

    let mut instances = Vec::new();
    if !body.quick_launch_name.is_empty() {
        instances.push((body.quick_launch_name.clone(), None));
    }
    for (target, count) in &body.targets {
        for _ in 0..*count {
            instances.push((target.clone(), None));
        }
    }
    Ok(instances)
}

/// POST /api/sessions
pub async fn spawn_sessions<M: MuxAdapter, P: ProcessControl>(
    State(state): State<AppState<M, P>>,
    headers: HeaderMap,
    Json(body): Json<SpawnBody>,
) -> Result<Json<Vec<SpawnResult>>, ApiError> {
    authorize(&state, &headers)?;
    let instances = requested_instances(&body)?;

    let mut results = Vec::with_capacity(instances.len());
    for (target, command) in instances {
        let nickname = if body.nickname.is_empty() {
            None
        } else {
            Some(body.nickname.clone())
        };

        let outcome = if body.remote_flavor_id.is_empty() {
            let selector = match selector(&body) {
                Ok(selector) => selector,
                Err(e) => {
                    results.push(SpawnResult::failure(
                        &target,
                        &body.prompt,
                        &body.nickname,
                        e.message,
                    ));
                    continue;
                }
            };
            state
                .manager
                .spawn(SpawnRequest {
                    workspace: selector,
                    target: target.clone(),
                    prompt: body.prompt.clone(),
                    nickname,
                    resume: body.resume,
                    command,
                })
                .await
        } else {
            state
                .manager
                .spawn_remote(
                    &body.remote_flavor_id,
                    &target,
                    &body.prompt,
                    nickname.as_deref(),
                )
                .await
        };

        results.push(match outcome {
            Ok(outcome) => SpawnResult {
                session_id: outcome.session.id.to_string(),
                workspace_id: outcome.session.workspace_id.clone(),
                target: outcome.session.target.clone(),
                command: outcome.command,
                prompt: body.prompt.clone(),
                nickname: outcome.session.nickname.clone().unwrap_or_default(),
                error: None,
            },
            Err(e) => {
                tracing::warn!(target, error = %e, "spawn failed");
                SpawnResult::failure(&target, &body.prompt, &body.nickname, e.to_string())
            }
        });
    }
    Ok(Json(results))
}

/// GET /api/sessions
pub async fn list_sessions<M: MuxAdapter, P: ProcessControl>(
    State(state): State<AppState<M, P>>,
    headers: HeaderMap,
) -> Result<Json<Vec<sx_core::Session>>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.manager.list_sessions()))
}

/// POST /api/sessions/{id}/dispose
pub async fn dispose_session<M: MuxAdapter, P: ProcessControl>(
    State(state): State<AppState<M, P>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let report = state.manager.dispose(&id).await?;
    for warning in &report.warnings {
        tracing::warn!(session_id = %id, warning, "dispose warning");
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// POST /api/workspaces/{id}/dispose
///
/// Disposes every session holding the workspace. The workspace record
/// itself persists.
pub async fn dispose_workspace<M: MuxAdapter, P: ProcessControl>(
    State(state): State<AppState<M, P>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    if state.manager.store().get_workspace(&id).is_none() {
        return Err(EngineError::WorkspaceNotFound(id).into());
    }
    for session in state.manager.list_sessions() {
        if session.workspace_id == id {
            dispose_logged(&state, session.id.as_str()).await;
        }
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// POST /api/workspaces/dispose-all
///
/// Disposes every session everywhere.
pub async fn dispose_all_workspaces<M: MuxAdapter, P: ProcessControl>(
    State(state): State<AppState<M, P>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    for session in state.manager.list_sessions() {
        dispose_logged(&state, session.id.as_str()).await;
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn dispose_logged<M: MuxAdapter, P: ProcessControl>(
    state: &AppState<M, P>,
    session_id: &str,
) {
    match state.manager.dispose(session_id).await {
        Ok(report) => {
            for warning in &report.warnings {
                tracing::warn!(session_id, warning, "dispose warning");
            }
        }
        Err(e) => {
            tracing::warn!(session_id, error = %e, "dispose failed");
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub nickname: String,
}

/// POST /api/sessions/{id}/rename
pub async fn rename_session<M: MuxAdapter, P: ProcessControl>(
    State(state): State<AppState<M, P>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RenameBody>,
) -> Result<Json<sx_core::Session>, ApiError> {
    authorize(&state, &headers)?;
    let session = state.manager.rename(&id, &body.nickname).await?;
    Ok(Json(session))
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
