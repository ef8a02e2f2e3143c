use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Paid membership tiers. Prices are in fen (1/100 CNY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipPlan {
    Monthly,
    Quarterly,
    Yearly,
}

impl MembershipPlan {
    pub const ALL: [MembershipPlan; 3] = [Self::Monthly, Self::Quarterly, Self::Yearly];

    pub fn price_cents(&self) -> i64 {
        match self {
            Self::Monthly => 2990,
            Self::Quarterly => 7990,
            Self::Yearly => 23990,
        }
    }

    pub fn duration_days(&self) -> i64 {
        match self {
            Self::Monthly => 31,
            Self::Quarterly => 93,
            Self::Yearly => 366,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Monthly => "月度会员",
            Self::Quarterly => "季度会员",
            Self::Yearly => "年度会员",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    /// New expiry after buying this plan.
    ///
    /// Renewing an active membership stacks on top of the remaining time;
    /// an expired or absent membership starts counting from `now`.
    pub fn extend_expiry(&self, current: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match current {
            Some(expires_at) if expires_at > now => expires_at,
            _ => now,
        };
        start + Duration::days(self.duration_days())
    }

    pub fn info(&self) -> PlanInfo {
        PlanInfo {
            plan: *self,
            title: self.title().to_string(),
            price_cents: self.price_cents(),
            duration_days: self.duration_days(),
        }
    }
}

impl fmt::Display for MembershipPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("unknown plan: {}", other)),
        }
    }
}

/// Public description of a plan, as listed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInfo {
    pub plan: MembershipPlan,
    pub title: String,
    pub price_cents: i64,
    pub duration_days: i64,
}

/// Format fen as a yuan amount with two decimals ("29.90")
pub fn format_yuan(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Parse a yuan amount ("29.9", "29.90", "30") into fen
pub fn parse_yuan(amount: &str) -> Option<i64> {
    let amount = amount.trim();
    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_new_membership_starts_now() {
        let now = at(1);
        assert_eq!(MembershipPlan::Monthly.extend_expiry(None, now), now + Duration::days(31));
    }

    #[test]
    fn test_renewal_stacks_on_active_membership() {
        let now = at(1);
        let current = at(11);
        assert_eq!(
            MembershipPlan::Quarterly.extend_expiry(Some(current), now),
            current + Duration::days(93)
        );
    }

    #[test]
    fn test_expired_membership_restarts_from_now() {
        let now = at(20);
        assert_eq!(
            MembershipPlan::Yearly.extend_expiry(Some(at(2)), now),
            now + Duration::days(366)
        );
    }

    #[test]
    fn test_plan_names() {
        for plan in MembershipPlan::ALL {
            assert_eq!(plan.as_str().parse::<MembershipPlan>().unwrap(), plan);
        }
        assert!("weekly".parse::<MembershipPlan>().is_err());
        assert_eq!(serde_json::to_string(&MembershipPlan::Quarterly).unwrap(), "\"quarterly\"");
    }

    #[test]
    fn test_yuan_formatting() {
        assert_eq!(format_yuan(2990), "29.90");
        assert_eq!(format_yuan(5), "0.05");
        assert_eq!(parse_yuan("29.90"), Some(2990));
        assert_eq!(parse_yuan("29.9"), Some(2990));
        assert_eq!(parse_yuan("30"), Some(3000));
        assert_eq!(parse_yuan("1.234"), None);
        assert_eq!(parse_yuan("-1.00"), None);
        assert_eq!(parse_yuan("abc"), None);
    }
}
