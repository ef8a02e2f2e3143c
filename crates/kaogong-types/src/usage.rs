use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const CHINA_UTC_OFFSET_HOURS: i64 = 8;

/// Metered features for free accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Chat,
    Quiz,
}

impl UsageKind {
    /// Field name inside the stored counter
    pub fn field(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Quiz => "quiz",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimits {
    pub chat_daily: u32,
    pub quiz_daily: u32,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            chat_daily: 20,
            quiz_daily: 5,
        }
    }
}

impl UsageLimits {
    pub fn limit(&self, kind: UsageKind) -> u32 {
        match kind {
            UsageKind::Chat => self.chat_daily,
            UsageKind::Quiz => self.quiz_daily,
        }
    }
}

/// Per-day usage of a free account. `day` is the China-local date the
/// counts belong to; a counter from an earlier day counts as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub chat: u32,
    #[serde(default)]
    pub quiz: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UsageDecision {
    Allowed { remaining: u32 },
    Exhausted { limit: u32 },
}

impl UsageCounter {
    pub fn used(&self, kind: UsageKind, today: &str) -> u32 {
        if self.day != today {
            return 0;
        }
        match kind {
            UsageKind::Chat => self.chat,
            UsageKind::Quiz => self.quiz,
        }
    }

    pub fn remaining(&self, kind: UsageKind, limits: &UsageLimits, today: &str) -> u32 {
        limits.limit(kind).saturating_sub(self.used(kind, today))
    }

    /// Decide without mutating
    pub fn evaluate(&self, kind: UsageKind, limits: &UsageLimits, today: &str) -> UsageDecision {
        let limit = limits.limit(kind);
        let used = self.used(kind, today);
        if used >= limit {
            UsageDecision::Exhausted { limit }
        } else {
            UsageDecision::Allowed {
                remaining: limit - used - 1,
            }
        }
    }

    /// Roll the counter over to `today` if needed, then take one unit
    pub fn deduct(&mut self, kind: UsageKind, limits: &UsageLimits, today: &str) -> UsageDecision {
        self.roll_over(today);
        let decision = self.evaluate(kind, limits, today);
        if let UsageDecision::Allowed { .. } = decision {
            *self.slot(kind) += 1;
        }
        decision
    }

    /// Give back one unit taken today; never goes below zero
    pub fn refund(&mut self, kind: UsageKind, today: &str) {
        if self.day != today {
            return;
        }
        let slot = self.slot(kind);
        *slot = slot.saturating_sub(1);
    }

    fn roll_over(&mut self, today: &str) {
        if self.day != today {
            *self = Self {
                day: today.to_string(),
                chat: 0,
                quiz: 0,
            };
        }
    }

    fn slot(&mut self, kind: UsageKind) -> &mut u32 {
        match kind {
            UsageKind::Chat => &mut self.chat,
            UsageKind::Quiz => &mut self.quiz,
        }
    }
}

/// Calendar day in China Standard Time (UTC+8), `YYYY-MM-DD`.
/// Free quotas reset at local midnight, not UTC midnight.
pub fn china_day(now: DateTime<Utc>) -> String {
    (now + Duration::hours(CHINA_UTC_OFFSET_HOURS))
        .format("%Y-%m-%d")
        .to_string()
}
