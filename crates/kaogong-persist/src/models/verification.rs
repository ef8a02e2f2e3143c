use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    Register,
    Login,
    ResetPassword,
}

/// SMS verification code; at most one live code per phone and purpose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub phone: String,
    pub purpose: CodePurpose,
    pub code: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn new(
        phone: impl Into<String>,
        purpose: CodePurpose,
        code: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            phone: phone.into(),
            purpose,
            code: code.into(),
            attempts: 0,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Decide the outcome of presenting `candidate`, without side effects
    pub fn check(&self, candidate: &str, now: DateTime<Utc>, max_attempts: u32) -> CodeCheck {
        if self.expires_at <= now {
            CodeCheck::Expired
        } else if self.attempts >= max_attempts {
            CodeCheck::TooManyAttempts
        } else if self.code == candidate {
            CodeCheck::Valid
        } else {
            CodeCheck::Mismatch
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    /// Correct; the code has been consumed
    Valid,
    /// Wrong code; one attempt counted
    Mismatch,
    Expired,
    TooManyAttempts,
    Missing,
}
