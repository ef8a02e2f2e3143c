use chrono::{DateTime, Utc};
use kaogong_types::{MembershipPlan, UsageCounter, UsageDecision};
use serde::{Deserialize, Serialize};

/// Database-agnostic account profile.
///
/// Sessions, notes and categories live in the same stored document but are
/// read through their own stores, so they are not part of this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub phone: String,
    pub password_hash: String,
    pub nickname: String,
    pub membership: Option<Membership>,
    pub usage: UsageCounter,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(phone: impl Into<String>, password_hash: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            phone: phone.into(),
            password_hash: password_hash.into(),
            nickname: nickname.into(),
            membership: None,
            usage: UsageCounter::default(),
            created_at: Utc::now(),
        }
    }

    /// Membership that has not expired yet
    pub fn active_membership(&self, now: DateTime<Utc>) -> Option<&Membership> {
        self.membership.as_ref().filter(|m| m.is_active(now))
    }

    pub fn is_member(&self, now: DateTime<Utc>) -> bool {
        self.active_membership(now).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub plan: MembershipPlan,
    pub expires_at: DateTime<Utc>,
}

impl Membership {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Result of `check_and_deduct_usage`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UsageOutcome {
    /// Active member, nothing was counted
    Unlimited,
    Allowed { remaining: u32 },
    Exhausted { limit: u32 },
}

impl UsageOutcome {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }

    /// Whether a unit was actually taken (and may need a refund)
    pub fn was_counted(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

impl From<UsageDecision> for UsageOutcome {
    fn from(decision: UsageDecision) -> Self {
        match decision {
            UsageDecision::Allowed { remaining } => Self::Allowed { remaining },
            UsageDecision::Exhausted { limit } => Self::Exhausted { limit },
        }
    }
}
