//! Process-local store with the same semantics as the MongoDB client.
//! Used for local development without a database and in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use kaogong_types::{china_day, MembershipPlan, UsageKind, UsageLimits};

use crate::error::{PersistError, Result};
use crate::models::{
    Category, ChatMessage, ChatSession, CodeCheck, CodePurpose, Membership, NewNote, Note,
    NoteUpdate, Order, OrderStatus, SessionSummary, UsageOutcome, User, VerificationCode,
};
use crate::trait_client::{NotebookStore, OrderStore, SessionStore, UserStore, VerificationStore};

struct UserRecord {
    user: User,
    sessions: Vec<ChatSession>,
    notes: Vec<Note>,
    categories: Vec<Category>,
    fulfilled_orders: HashSet<String>,
}

#[derive(Default)]
struct State {
    users: HashMap<String, UserRecord>,
    orders: HashMap<String, Order>,
    codes: HashMap<(String, CodePurpose), VerificationCode>,
}

#[derive(Default)]
pub struct InMemoryPersistenceClient {
    state: RwLock<State>,
}

impl InMemoryPersistenceClient {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn user_not_found(user_id: &str) -> PersistError {
    PersistError::NotFound(format!("user {}", user_id))
}

impl State {
    fn record(&self, user_id: &str) -> Result<&UserRecord> {
        self.users.get(user_id).ok_or_else(|| user_not_found(user_id))
    }

    fn record_mut(&mut self, user_id: &str) -> Result<&mut UserRecord> {
        self.users.get_mut(user_id).ok_or_else(|| user_not_found(user_id))
    }
}

#[async_trait]
impl UserStore for InMemoryPersistenceClient {
    async fn create_user(&self, mut user: User) -> Result<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|r| r.user.phone == user.phone) {
            return Err(PersistError::Conflict(format!("phone {}", user.phone)));
        }
        user.id = new_id();
        state.users.insert(
            user.id.clone(),
            UserRecord {
                user: user.clone(),
                sessions: Vec::new(),
                notes: Vec::new(),
                categories: Vec::new(),
                fulfilled_orders: HashSet::new(),
            },
        );
        Ok(user)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(user_id).map(|r| r.user.clone()))
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|r| r.user.phone == phone)
            .map(|r| r.user.clone()))
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.record_mut(user_id)?.user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn check_and_deduct_usage(
        &self,
        user_id: &str,
        kind: UsageKind,
        limits: &UsageLimits,
        now: DateTime<Utc>,
    ) -> Result<UsageOutcome> {
        let mut state = self.state.write().await;
        let user = &mut state.record_mut(user_id)?.user;
        if user.is_member(now) {
            return Ok(UsageOutcome::Unlimited);
        }
        let today = china_day(now);
        Ok(user.usage.deduct(kind, limits, &today).into())
    }

    async fn refund_usage(&self, user_id: &str, kind: UsageKind, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let today = china_day(now);
        state.record_mut(user_id)?.user.usage.refund(kind, &today);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemoryPersistenceClient {
    async fn create_session(&self, user_id: &str, title: Option<String>) -> Result<ChatSession> {
        let mut state = self.state.write().await;
        let session = ChatSession::new(title);
        state.record_mut(user_id)?.sessions.push(session.clone());
        Ok(session)
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let state = self.state.read().await;
        let mut sessions: Vec<SessionSummary> = state
            .record(user_id)?
            .sessions
            .iter()
            .map(ChatSession::summary)
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<ChatSession>> {
        let state = self.state.read().await;
        Ok(state
            .record(user_id)?
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned())
    }

    async fn rename_session(&self, user_id: &str, session_id: &str, title: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let record = state.record_mut(user_id)?;
        match record.sessions.iter_mut().find(|s| s.id == session_id) {
            Some(session) => {
                session.title = title.to_string();
                session.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let record = state.record_mut(user_id)?;
        let before = record.sessions.len();
        record.sessions.retain(|s| s.id != session_id);
        Ok(record.sessions.len() != before)
    }

    async fn append_message(&self, user_id: &str, session_id: &str, message: ChatMessage) -> Result<bool> {
        let mut state = self.state.write().await;
        let record = state.record_mut(user_id)?;
        match record.sessions.iter_mut().find(|s| s.id == session_id) {
            Some(session) => {
                session.updated_at = message.created_at;
                session.messages.push(message);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl NotebookStore for InMemoryPersistenceClient {
    async fn create_category(&self, user_id: &str, name: &str) -> Result<Category> {
        let mut state = self.state.write().await;
        let record = state.record_mut(user_id)?;
        if record.categories.iter().any(|c| c.name == name) {
            return Err(PersistError::Conflict(format!("category {}", name)));
        }
        let category = Category::new(name);
        record.categories.push(category.clone());
        Ok(category)
    }

    async fn list_categories(&self, user_id: &str) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        Ok(state.record(user_id)?.categories.clone())
    }

    async fn delete_category(&self, user_id: &str, category_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let record = state.record_mut(user_id)?;
        let before = record.categories.len();
        record.categories.retain(|c| c.id != category_id);
        if record.categories.len() == before {
            return Ok(false);
        }
        for note in record
            .notes
            .iter_mut()
            .filter(|n| n.category_id.as_deref() == Some(category_id))
        {
            note.category_id = None;
        }
        Ok(true)
    }

    async fn add_note(&self, user_id: &str, note: NewNote) -> Result<Note> {
        let mut state = self.state.write().await;
        let record = state.record_mut(user_id)?;
        if let Some(category_id) = note.category_id.as_deref() {
            if !record.categories.iter().any(|c| c.id == category_id) {
                return Err(PersistError::NotFound(format!("category {}", category_id)));
            }
        }
        let note = note.into_note();
        record.notes.push(note.clone());
        Ok(note)
    }

    async fn list_notes(&self, user_id: &str, category_id: Option<&str>) -> Result<Vec<Note>> {
        let state = self.state.read().await;
        let mut notes: Vec<Note> = state
            .record(user_id)?
            .notes
            .iter()
            .filter(|n| category_id.is_none() || n.category_id.as_deref() == category_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    async fn update_note(&self, user_id: &str, note_id: &str, update: NoteUpdate) -> Result<Option<Note>> {
        let mut state = self.state.write().await;
        let record = state.record_mut(user_id)?;
        if let Some(category_id) = update.category_id.as_deref() {
            if !update.clear_category && !record.categories.iter().any(|c| c.id == category_id) {
                return Err(PersistError::NotFound(format!("category {}", category_id)));
            }
        }
        match record.notes.iter_mut().find(|n| n.id == note_id) {
            Some(note) => {
                update.apply(note);
                Ok(Some(note.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_note(&self, user_id: &str, note_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let record = state.record_mut(user_id)?;
        let before = record.notes.len();
        record.notes.retain(|n| n.id != note_id);
        Ok(record.notes.len() != before)
    }
}

#[async_trait]
impl OrderStore for InMemoryPersistenceClient {
    async fn create_order(&self, mut order: Order) -> Result<Order> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.out_trade_no) {
            return Err(PersistError::Conflict(format!("order {}", order.out_trade_no)));
        }
        order.id = new_id();
        state.orders.insert(order.out_trade_no.clone(), order.clone());
        Ok(order)
    }

    async fn find_order(&self, out_trade_no: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(out_trade_no).cloned())
    }

    async fn mark_order_paid(
        &self,
        out_trade_no: &str,
        trade_no: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(out_trade_no) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = OrderStatus::Paid;
                order.trade_no = Some(trade_no.to_string());
                order.paid_at = Some(paid_at);
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn activate_membership(
        &self,
        user_id: &str,
        plan: MembershipPlan,
        now: DateTime<Utc>,
    ) -> Result<Membership> {
        let mut state = self.state.write().await;
        Ok(extend_membership(&mut state.record_mut(user_id)?.user, plan, now))
    }

    async fn fulfil_order(&self, order: &Order, now: DateTime<Utc>) -> Result<Option<Membership>> {
        let mut state = self.state.write().await;
        let record = state.record_mut(&order.user_id)?;
        if !record.fulfilled_orders.insert(order.out_trade_no.clone()) {
            return Ok(None);
        }
        Ok(Some(extend_membership(&mut record.user, order.plan, now)))
    }
}

fn extend_membership(user: &mut User, plan: MembershipPlan, now: DateTime<Utc>) -> Membership {
    let current = user.membership.as_ref().map(|m| m.expires_at);
    let membership = Membership {
        plan,
        expires_at: plan.extend_expiry(current, now),
    };
    user.membership = Some(membership.clone());
    membership
}

#[async_trait]
impl VerificationStore for InMemoryPersistenceClient {
    async fn save_code(&self, code: VerificationCode) -> Result<()> {
        let mut state = self.state.write().await;
        state.codes.insert((code.phone.clone(), code.purpose), code);
        Ok(())
    }

    async fn latest_code(&self, phone: &str, purpose: CodePurpose) -> Result<Option<VerificationCode>> {
        let state = self.state.read().await;
        Ok(state.codes.get(&(phone.to_string(), purpose)).cloned())
    }

    async fn consume_code(
        &self,
        phone: &str,
        purpose: CodePurpose,
        code: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<CodeCheck> {
        let mut state = self.state.write().await;
        let key = (phone.to_string(), purpose);
        let Some(stored) = state.codes.get_mut(&key) else {
            return Ok(CodeCheck::Missing);
        };
        let check = stored.check(code, now, max_attempts);
        match check {
            CodeCheck::Valid | CodeCheck::Expired => {
                state.codes.remove(&key);
            }
            CodeCheck::Mismatch => stored.attempts += 1,
            CodeCheck::TooManyAttempts | CodeCheck::Missing => {}
        }
        Ok(check)
    }
}
