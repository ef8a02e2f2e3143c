use chrono::{DateTime, Utc};
use kaogong_types::MembershipPlan;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Closed,
}

/// Membership purchase. `out_trade_no` is our order number as sent to the
/// payment gateway; `trade_no` is the gateway's own reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub out_trade_no: String,
    pub user_id: String,
    pub plan: MembershipPlan,
    pub amount_cents: i64,
    pub status: OrderStatus,
    pub trade_no: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(user_id: impl Into<String>, plan: MembershipPlan, out_trade_no: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            out_trade_no: out_trade_no.into(),
            user_id: user_id.into(),
            plan,
            amount_cents: plan.price_cents(),
            status: OrderStatus::Pending,
            trade_no: None,
            created_at: Utc::now(),
            paid_at: None,
        }
    }
}
