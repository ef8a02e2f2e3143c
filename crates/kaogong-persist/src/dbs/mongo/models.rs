use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use kaogong_types::{MembershipPlan, UsageCounter};
use serde::{Deserialize, Serialize};

use crate::error::{PersistError, Result};
use crate::models::{
    Category, ChatSession, CodePurpose, Membership, Note, Order, OrderStatus, SessionSummary, User,
    VerificationCode,
};

pub(crate) fn parse_object_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|e| PersistError::InvalidObjectId(e.to_string()))
}

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        _ => false,
    }
}

/// One document per account in `users`. Sessions, notes and categories are
/// embedded; profile reads project them away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUser {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub phone: String,
    pub password_hash: String,
    pub nickname: String,
    pub membership: Option<Membership>,
    #[serde(default)]
    pub usage: UsageCounter,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sessions: Vec<ChatSession>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub categories: Vec<Category>,
    /// `out_trade_no` of every order whose membership was granted
    #[serde(default)]
    pub fulfilled_orders: Vec<String>,
}

/// Projection used for profile reads
pub(crate) fn profile_projection() -> bson::Document {
    bson::doc! { "sessions": 0, "notes": 0, "categories": 0, "fulfilled_orders": 0 }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionsField {
    #[serde(default)]
    pub sessions: Vec<ChatSession>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionSummariesField {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NotesField {
    #[serde(default)]
    pub notes: Vec<Note>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoriesField {
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileFields {
    pub membership: Option<Membership>,
    #[serde(default)]
    pub usage: UsageCounter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoOrder {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub out_trade_no: String,
    pub user_id: String,
    pub plan: MembershipPlan,
    pub amount_cents: i64,
    pub status: OrderStatus,
    pub trade_no: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// `expires_at` is a BSON date so the TTL index can reap stale codes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVerificationCode {
    pub phone: String,
    pub purpose: CodePurpose,
    pub code: String,
    pub attempts: u32,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

// Conversions between database-agnostic and MongoDB-specific models

impl From<User> for MongoUser {
    fn from(user: User) -> Self {
        let id = ObjectId::parse_str(&user.id).unwrap_or_else(|_| ObjectId::new());
        Self {
            id,
            phone: user.phone,
            password_hash: user.password_hash,
            nickname: user.nickname,
            membership: user.membership,
            usage: user.usage,
            created_at: user.created_at,
            sessions: Vec::new(),
            notes: Vec::new(),
            categories: Vec::new(),
            fulfilled_orders: Vec::new(),
        }
    }
}

impl From<MongoUser> for User {
    fn from(user: MongoUser) -> Self {
        Self {
            id: user.id.to_hex(),
            phone: user.phone,
            password_hash: user.password_hash,
            nickname: user.nickname,
            membership: user.membership,
            usage: user.usage,
            created_at: user.created_at,
        }
    }
}

impl From<Order> for MongoOrder {
    fn from(order: Order) -> Self {
        let id = ObjectId::parse_str(&order.id).unwrap_or_else(|_| ObjectId::new());
        Self {
            id,
            out_trade_no: order.out_trade_no,
            user_id: order.user_id,
            plan: order.plan,
            amount_cents: order.amount_cents,
            status: order.status,
            trade_no: order.trade_no,
            created_at: order.created_at,
            paid_at: order.paid_at,
        }
    }
}

impl From<MongoOrder> for Order {
    fn from(order: MongoOrder) -> Self {
        Self {
            id: order.id.to_hex(),
            out_trade_no: order.out_trade_no,
            user_id: order.user_id,
            plan: order.plan,
            amount_cents: order.amount_cents,
            status: order.status,
            trade_no: order.trade_no,
            created_at: order.created_at,
            paid_at: order.paid_at,
        }
    }
}

impl From<VerificationCode> for MongoVerificationCode {
    fn from(code: VerificationCode) -> Self {
        Self {
            phone: code.phone,
            purpose: code.purpose,
            code: code.code,
            attempts: code.attempts,
            created_at: code.created_at,
            expires_at: code.expires_at,
        }
    }
}

impl From<MongoVerificationCode> for VerificationCode {
    fn from(code: MongoVerificationCode) -> Self {
        Self {
            phone: code.phone,
            purpose: code.purpose,
            code: code.code,
            attempts: code.attempts,
            created_at: code.created_at,
            expires_at: code.expires_at,
        }
    }
}
