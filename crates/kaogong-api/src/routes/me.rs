use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use kaogong_persist::{Membership, User};
use kaogong_types::{china_day, UsageKind, UsageLimits};

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    state::AppState,
};

/// Today's free quota; `None` means unlimited (active member)
#[derive(Debug, Serialize)]
pub struct RemainingUsage {
    pub chat: Option<u32>,
    pub quiz: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub phone: String,
    pub nickname: String,
    pub is_member: bool,
    pub membership: Option<Membership>,
    pub remaining: RemainingUsage,
    pub created_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(user: User, limits: &UsageLimits, now: DateTime<Utc>) -> Self {
        let is_member = user.is_member(now);
        let today = china_day(now);
        let remaining = |kind| (!is_member).then(|| user.usage.remaining(kind, limits, &today));
        let remaining = RemainingUsage {
            chat: remaining(UsageKind::Chat),
            quiz: remaining(UsageKind::Quiz),
        };
        Self {
            id: user.id,
            phone: user.phone,
            nickname: user.nickname,
            is_member,
            membership: user.membership,
            remaining,
            created_at: user.created_at,
        }
    }
}

/// Current user's profile, membership and remaining quota
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile of the caller"),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "account"
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<UserResponse>> {
    let user = state
        .persist
        .find_user(&auth.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    let limits = state.config.usage_limits();
    Ok(Json(UserResponse::new(user, &limits, Utc::now())))
}
