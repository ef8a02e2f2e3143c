use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use kaogong_persist::{Category, NewNote, Note, NoteUpdate};

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    state::AppState,
};

const MAX_CATEGORY_CHARS: usize = 30;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListNotesQuery {
    /// Only notes filed under this category
    pub category_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/notebook/categories",
    responses((status = 200, description = "Categories")),
    tag = "notebook"
)]
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.persist.list_categories(&auth.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/notebook/categories",
    responses(
        (status = 201, description = "Category created"),
        (status = 409, description = "A category with this name exists")
    ),
    tag = "notebook"
)]
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_CATEGORY_CHARS {
        return Err(ApiError::BadRequest(format!(
            "category name must be 1 to {} characters",
            MAX_CATEGORY_CHARS
        )));
    }
    let category = state.persist.create_category(&auth.user_id, name).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// Delete a category; its notes stay, uncategorised
#[utoipa::path(
    delete,
    path = "/notebook/categories/{category_id}",
    params(("category_id" = String, Path, description = "Category id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Category not found")
    ),
    tag = "notebook"
)]
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(category_id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.persist.delete_category(&auth.user_id, &category_id).await? {
        return Err(ApiError::NotFound(format!("category {}", category_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/notebook/notes",
    params(ListNotesQuery),
    responses((status = 200, description = "Notes, newest first")),
    tag = "notebook"
)]
pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListNotesQuery>,
) -> ApiResult<Json<Vec<Note>>> {
    let category_id = query.category_id.as_deref().filter(|c| !c.is_empty());
    Ok(Json(state.persist.list_notes(&auth.user_id, category_id).await?))
}

/// Bookmark a question, optionally into a category
#[utoipa::path(
    post,
    path = "/notebook/notes",
    responses(
        (status = 201, description = "Note saved"),
        (status = 404, description = "Category not found")
    ),
    tag = "notebook"
)]
pub async fn add_note(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(note): Json<NewNote>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    if note.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }
    let note = state.persist.add_note(&auth.user_id, note).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

#[utoipa::path(
    patch,
    path = "/notebook/notes/{note_id}",
    params(("note_id" = String, Path, description = "Note id")),
    responses(
        (status = 200, description = "Updated note"),
        (status = 404, description = "Note or category not found")
    ),
    tag = "notebook"
)]
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(note_id): Path<String>,
    Json(update): Json<NoteUpdate>,
) -> ApiResult<Json<Note>> {
    if update.question.as_deref().is_some_and(|q| q.trim().is_empty()) {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }
    let note = state
        .persist
        .update_note(&auth.user_id, &note_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("note {}", note_id)))?;
    Ok(Json(note))
}

#[utoipa::path(
    delete,
    path = "/notebook/notes/{note_id}",
    params(("note_id" = String, Path, description = "Note id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Note not found")
    ),
    tag = "notebook"
)]
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(note_id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.persist.delete_note(&auth.user_id, &note_id).await? {
        return Err(ApiError::NotFound(format!("note {}", note_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}
