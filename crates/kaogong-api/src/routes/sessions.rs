use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use kaogong_persist::{ChatSession, SessionSummary};

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    state::AppState,
};

const MAX_TITLE_CHARS: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub title: String,
}

fn session_not_found(session_id: &str) -> ApiError {
    ApiError::NotFound(format!("session {}", session_id))
}

/// List the caller's tutor sessions, most recently active first
#[utoipa::path(
    get,
    path = "/sessions",
    responses((status = 200, description = "Session summaries")),
    tag = "sessions"
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    Ok(Json(state.persist.list_sessions(&auth.user_id).await?))
}

/// Start a new tutor session
#[utoipa::path(
    post,
    path = "/sessions",
    responses((status = 201, description = "Session created")),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    body: Option<Json<CreateSessionRequest>>,
) -> ApiResult<(StatusCode, Json<ChatSession>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    if let Some(title) = req.title.as_deref() {
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ApiError::BadRequest(format!(
                "title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }
    }
    let session = state.persist.create_session(&auth.user_id, req.title).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Get a session with its full message history
#[utoipa::path(
    get,
    path = "/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session with messages"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    let session = state
        .persist
        .get_session(&auth.user_id, &session_id)
        .await?
        .ok_or_else(|| session_not_found(&session_id))?;
    Ok(Json(session))
}

/// Rename a session
#[utoipa::path(
    patch,
    path = "/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Renamed"),
        (status = 400, description = "Empty or overlong title"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn rename_session(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Json(req): Json<RenameSessionRequest>,
) -> ApiResult<StatusCode> {
    let title = req.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "title must be 1 to {} characters",
            MAX_TITLE_CHARS
        )));
    }
    if !state.persist.rename_session(&auth.user_id, &session_id, title).await? {
        return Err(session_not_found(&session_id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a session and its history
#[utoipa::path(
    delete,
    path = "/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.persist.delete_session(&auth.user_id, &session_id).await? {
        return Err(session_not_found(&session_id));
    }
    Ok(StatusCode::NO_CONTENT)
}
