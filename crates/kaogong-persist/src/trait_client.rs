use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kaogong_types::{MembershipPlan, UsageKind, UsageLimits};

use crate::error::Result;
use crate::models::{
    Category, ChatMessage, ChatSession, CodeCheck, CodePurpose, Membership, NewNote, Note,
    NoteUpdate, Order, SessionSummary, UsageOutcome, User, VerificationCode,
};

/// Accounts and the free-tier usage counter
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account; a phone number already in use is a `Conflict`
    async fn create_user(&self, user: User) -> Result<User>;

    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>>;

    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()>;

    /// Take one unit of `kind` from today's free quota.
    ///
    /// Active members are never counted. The counter resets on the first use
    /// of each China-local day. The check and the increment are one
    /// conditional write, so concurrent requests cannot overshoot the limit.
    async fn check_and_deduct_usage(
        &self,
        user_id: &str,
        kind: UsageKind,
        limits: &UsageLimits,
        now: DateTime<Utc>,
    ) -> Result<UsageOutcome>;

    /// Give back a unit taken earlier the same day (upstream failure)
    async fn refund_usage(&self, user_id: &str, kind: UsageKind, now: DateTime<Utc>) -> Result<()>;

    /// Cheap round trip to the backing store
    async fn ping(&self) -> Result<()>;
}

/// Tutor conversations embedded in the user document
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, user_id: &str, title: Option<String>) -> Result<ChatSession>;

    /// Most recently updated first
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>>;

    async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<ChatSession>>;

    /// Returns false when the session does not exist
    async fn rename_session(&self, user_id: &str, session_id: &str, title: &str) -> Result<bool>;

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool>;

    /// Append and bump `updated_at`; false when the session does not exist
    async fn append_message(&self, user_id: &str, session_id: &str, message: ChatMessage) -> Result<bool>;
}

/// Bookmarked questions and their categories
#[async_trait]
pub trait NotebookStore: Send + Sync {
    /// Names are unique per user (`Conflict`)
    async fn create_category(&self, user_id: &str, name: &str) -> Result<Category>;

    async fn list_categories(&self, user_id: &str) -> Result<Vec<Category>>;

    /// Notes filed under the category become uncategorised
    async fn delete_category(&self, user_id: &str, category_id: &str) -> Result<bool>;

    /// Unknown `category_id` is `NotFound`
    async fn add_note(&self, user_id: &str, note: NewNote) -> Result<Note>;

    /// Newest first, optionally restricted to one category
    async fn list_notes(&self, user_id: &str, category_id: Option<&str>) -> Result<Vec<Note>>;

    async fn update_note(&self, user_id: &str, note_id: &str, update: NoteUpdate) -> Result<Option<Note>>;

    async fn delete_note(&self, user_id: &str, note_id: &str) -> Result<bool>;
}

/// Membership orders and activation
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: Order) -> Result<Order>;

    async fn find_order(&self, out_trade_no: &str) -> Result<Option<Order>>;

    /// Pending → Paid. Returns the paid order only for the call that made
    /// the transition; repeated gateway notifications get `None`.
    async fn mark_order_paid(
        &self,
        out_trade_no: &str,
        trade_no: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<Order>>;

    /// Extend the user's membership by `plan`, stacking on unexpired time
    async fn activate_membership(
        &self,
        user_id: &str,
        plan: MembershipPlan,
        now: DateTime<Utc>,
    ) -> Result<Membership>;

    /// Grant the membership bought with a paid `order`, once per order.
    ///
    /// The order number is recorded on the user in the same write that
    /// extends the membership, so calling this again after a failure or
    /// for a repeated notification never extends twice. Returns `None`
    /// when the order was already applied.
    async fn fulfil_order(&self, order: &Order, now: DateTime<Utc>) -> Result<Option<Membership>>;
}

/// SMS verification codes
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Replaces any earlier code for the same phone and purpose
    async fn save_code(&self, code: VerificationCode) -> Result<()>;

    async fn latest_code(&self, phone: &str, purpose: CodePurpose) -> Result<Option<VerificationCode>>;

    /// Check `code`; a valid code is deleted, a wrong one counts an attempt
    async fn consume_code(
        &self,
        phone: &str,
        purpose: CodePurpose,
        code: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<CodeCheck>;
}

/// Everything the API needs from storage
pub trait PersistenceClient:
    UserStore + SessionStore + NotebookStore + OrderStore + VerificationStore
{
}

impl<T> PersistenceClient for T where
    T: UserStore + SessionStore + NotebookStore + OrderStore + VerificationStore
{
}
