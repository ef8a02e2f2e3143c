use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use kaogong_persist::{CodeCheck, CodePurpose, User, VerificationCode};

use crate::routes::me::UserResponse;
use crate::services::sms::mask_phone;
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_NICKNAME_CHARS: usize = 20;

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub phone: String,
    pub purpose: CodePurpose,
}

#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub expires_in_secs: i64,
    pub resend_after_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub phone: String,
    pub code: String,
    pub password: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeLoginRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub phone: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Mainland mobile number: 11 digits starting with 1
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 11 && phone.starts_with('1') && phone.bytes().all(|b| b.is_ascii_digit())
}

fn check_phone(phone: &str) -> ApiResult<()> {
    if is_valid_phone(phone) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("phone must be an 11-digit mobile number".to_string()))
    }
}

fn check_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Treat anything but a valid code as a failed verification
fn require_valid_code(check: CodeCheck) -> ApiResult<()> {
    match check {
        CodeCheck::Valid => Ok(()),
        CodeCheck::TooManyAttempts => Err(ApiError::TooManyRequests(
            "too many wrong attempts, request a new code".to_string(),
        )),
        CodeCheck::Expired => Err(ApiError::BadRequest("verification code has expired".to_string())),
        CodeCheck::Mismatch | CodeCheck::Missing => {
            Err(ApiError::BadRequest("verification code is incorrect".to_string()))
        }
    }
}

fn auth_response(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let token = state
        .tokens
        .issue(&user.id)
        .map_err(|e| ApiError::Internal(format!("token signing failed: {}", e)))?;
    let limits = state.config.usage_limits();
    Ok(AuthResponse {
        token,
        user: UserResponse::new(user, &limits, Utc::now()),
    })
}

/// Send a verification code by SMS
#[utoipa::path(
    post,
    path = "/auth/code",
    responses(
        (status = 200, description = "Code sent"),
        (status = 400, description = "Invalid phone number"),
        (status = 404, description = "No account for this phone (login, reset)"),
        (status = 409, description = "Phone already registered (register)"),
        (status = 429, description = "Requested again before the cooldown ended")
    ),
    tag = "auth"
)]
pub async fn send_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendCodeRequest>,
) -> ApiResult<Json<SendCodeResponse>> {
    check_phone(&req.phone)?;
    let auth = &state.config.auth;
    let now = Utc::now();

    if let Some(previous) = state.persist.latest_code(&req.phone, req.purpose).await? {
        let elapsed = now - previous.created_at;
        if elapsed < Duration::seconds(auth.code_cooldown_secs) {
            let wait = auth.code_cooldown_secs - elapsed.num_seconds();
            return Err(ApiError::TooManyRequests(format!("retry in {} seconds", wait)));
        }
    }

    let existing = state.persist.find_user_by_phone(&req.phone).await?;
    match (req.purpose, existing.is_some()) {
        (CodePurpose::Register, true) => {
            return Err(ApiError::Conflict("phone already registered".to_string()));
        }
        (CodePurpose::Login | CodePurpose::ResetPassword, false) => {
            return Err(ApiError::NotFound("account".to_string()));
        }
        _ => {}
    }

    let code = format!("{:06}", rand::random_range(0..1_000_000u32));
    let record = VerificationCode::new(
        &req.phone,
        req.purpose,
        &code,
        now,
        Duration::seconds(auth.code_ttl_secs),
    );
    state.persist.save_code(record).await?;
    state
        .code_sender
        .send_code(&req.phone, req.purpose, &code)
        .await
        .map_err(|e| ApiError::Internal(format!("sending code to {} failed: {:#}", mask_phone(&req.phone), e)))?;

    Ok(Json(SendCodeResponse {
        expires_in_secs: auth.code_ttl_secs,
        resend_after_secs: auth.code_cooldown_secs,
    }))
}

/// Create an account with a verified phone number
#[utoipa::path(
    post,
    path = "/auth/register",
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "Invalid input or verification code"),
        (status = 409, description = "Phone already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    check_phone(&req.phone)?;
    check_password(&req.password)?;
    let nickname = match req.nickname.as_deref().map(str::trim) {
        Some(n) if n.chars().count() > MAX_NICKNAME_CHARS => {
            return Err(ApiError::BadRequest(format!(
                "nickname must be at most {} characters",
                MAX_NICKNAME_CHARS
            )));
        }
        Some(n) if !n.is_empty() => n.to_string(),
        _ => format!("考生{}", &req.phone[7..]),
    };

    let check = state
        .persist
        .consume_code(
            &req.phone,
            CodePurpose::Register,
            req.code.trim(),
            Utc::now(),
            state.config.auth.code_max_attempts,
        )
        .await?;
    require_valid_code(check)?;

    let password_hash = hash_password(&req.password)?;
    let user = state
        .persist
        .create_user(User::new(&req.phone, password_hash, nickname))
        .await?;
    tracing::info!(user_id = %user.id, phone = %mask_phone(&user.phone), "User registered");

    Ok((StatusCode::CREATED, Json(auth_response(&state, user)?)))
}

/// Log in with phone and password
#[utoipa::path(
    post,
    path = "/auth/login",
    responses(
        (status = 200, description = "Logged in"),
        (status = 401, description = "Wrong phone or password")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = state
        .persist
        .find_user_by_phone(&req.phone)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(auth_response(&state, user)?))
}

/// Log in with an SMS code
#[utoipa::path(
    post,
    path = "/auth/login/code",
    responses(
        (status = 200, description = "Logged in"),
        (status = 401, description = "Wrong or expired code"),
        (status = 429, description = "Too many wrong attempts")
    ),
    tag = "auth"
)]
pub async fn login_with_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CodeLoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let check = state
        .persist
        .consume_code(
            &req.phone,
            CodePurpose::Login,
            req.code.trim(),
            Utc::now(),
            state.config.auth.code_max_attempts,
        )
        .await?;
    match check {
        CodeCheck::Valid => {}
        CodeCheck::TooManyAttempts => require_valid_code(check)?,
        _ => return Err(ApiError::Unauthorized),
    }
    let user = state
        .persist
        .find_user_by_phone(&req.phone)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(auth_response(&state, user)?))
}

/// Set a new password after verifying the phone
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid input or verification code"),
        (status = 404, description = "No account for this phone")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<StatusCode> {
    check_password(&req.new_password)?;
    let check = state
        .persist
        .consume_code(
            &req.phone,
            CodePurpose::ResetPassword,
            req.code.trim(),
            Utc::now(),
            state.config.auth.code_max_attempts,
        )
        .await?;
    require_valid_code(check)?;

    let user = state
        .persist
        .find_user_by_phone(&req.phone)
        .await?
        .ok_or_else(|| ApiError::NotFound("account".to_string()))?;
    let password_hash = hash_password(&req.new_password)?;
    state.persist.update_password(&user.id, &password_hash).await?;
    tracing::info!(user_id = %user.id, "Password reset");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("13812345678"));
        assert!(!is_valid_phone("23812345678"));
        assert!(!is_valid_phone("1381234567"));
        assert!(!is_valid_phone("1381234567a"));
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }
}
