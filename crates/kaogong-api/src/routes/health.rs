use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: HashMap<String, String>,
}

/// Liveness plus database reachability. Always answers 200; `status` is
/// `degraded` when MongoDB does not answer the ping.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy")
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let database_up = match state.persist.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("MongoDB ping failed: {}", e);
            false
        }
    };
    let services = HashMap::from([(
        "mongodb".to_string(),
        if database_up { "connected" } else { "disconnected" }.to_string(),
    )]);

    Ok(Json(HealthResponse {
        status: if database_up { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
    }))
}
