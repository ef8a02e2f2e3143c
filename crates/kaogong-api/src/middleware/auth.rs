use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::{error::ApiError, state::AppState};

/// Authenticated caller, inserted into request extensions by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Extract and validate the bearer JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.tokens.verify(token).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(AuthUser { user_id: claims.sub });
    Ok(next.run(req).await)
}
