use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use kaogong_persist::PersistError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Daily {kind} limit of {limit} reached, upgrade to membership for unlimited use")]
    UsageExhausted { kind: &'static str, limit: u32 },

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Upstream model error: {0}")]
    Upstream(#[source] anyhow::Error),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::UsageExhausted { .. } | ApiError::TooManyRequests(_) => {
                (StatusCode::TOO_MANY_REQUESTS, self.to_string())
            }
            ApiError::Upstream(ref e) => {
                tracing::error!("Upstream model error: {:#}", e);
                (StatusCode::BAD_GATEWAY, "Model service unavailable".to_string())
            }
            ApiError::Persist(PersistError::NotFound(ref what)) => {
                (StatusCode::NOT_FOUND, format!("{} not found", what))
            }
            ApiError::Persist(PersistError::Conflict(ref what)) => {
                (StatusCode::CONFLICT, format!("Already exists: {}", what))
            }
            ApiError::Persist(PersistError::InvalidObjectId(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid identifier".to_string())
            }
            ApiError::Persist(ref e) => {
                tracing::error!("Persistence error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ApiError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_message() {
        let (status, body) = body_of(ApiError::BadRequest("phone".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request: phone");
    }

    #[tokio::test]
    async fn test_usage_exhausted_is_429() {
        let (status, _) = body_of(ApiError::UsageExhausted { kind: "chat", limit: 20 }).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = body_of(ApiError::Persist(PersistError::Internal("socket reset".into()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Storage error");

        let (status, body) = body_of(ApiError::Upstream(anyhow::anyhow!("401 bad key"))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!body["error"].as_str().unwrap().contains("bad key"));
    }

    #[tokio::test]
    async fn test_persist_not_found_maps_to_404() {
        let (status, _) = body_of(ApiError::Persist(PersistError::NotFound("category x".into()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
