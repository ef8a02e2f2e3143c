use std::time::Duration;

use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};
use kaogong_types::{MembershipPlan, UsageKind, UsageLimits};
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};

use crate::dbs::mongo::models::{parse_object_id, MongoOrder, MongoUser};
use crate::dbs::mongo::repositories::{
    MongoNotebookRepository, MongoOrderRepository, MongoSessionRepository, MongoUserRepository,
    MongoVerificationRepository,
};
use crate::error::{PersistError, Result};
use crate::models::{
    Category, ChatMessage, ChatSession, CodeCheck, CodePurpose, Membership, NewNote, Note,
    NoteUpdate, Order, SessionSummary, UsageOutcome, User, VerificationCode,
};
use crate::trait_client::{NotebookStore, OrderStore, SessionStore, UserStore, VerificationStore};

pub struct MongoPersistenceClient {
    database: Database,
    user_repo: MongoUserRepository,
    session_repo: MongoSessionRepository,
    notebook_repo: MongoNotebookRepository,
    order_repo: MongoOrderRepository,
    verification_repo: MongoVerificationRepository,
}

impl MongoPersistenceClient {
    /// Connect to MongoDB, create client and make sure indexes exist
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        let persist = Self {
            database: client.database(database),
            user_repo: MongoUserRepository::new(&client, database),
            session_repo: MongoSessionRepository::new(&client, database),
            notebook_repo: MongoNotebookRepository::new(&client, database),
            order_repo: MongoOrderRepository::new(&client, database),
            verification_repo: MongoVerificationRepository::new(&client, database),
        };
        persist.ensure_indexes().await?;
        Ok(persist)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.user_repo
            .collection()
            .create_index(IndexModel::builder().keys(doc! { "phone": 1 }).options(unique()).build())
            .await?;
        self.order_repo
            .collection()
            .create_index(IndexModel::builder().keys(doc! { "out_trade_no": 1 }).options(unique()).build())
            .await?;
        self.order_repo
            .collection()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1, "created_at": -1 }).build())
            .await?;

        let codes = self.verification_repo.collection();
        codes
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "phone": 1, "purpose": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        codes
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "expires_at": 1 })
                    .options(IndexOptions::builder().expire_after(Duration::from_secs(0)).build())
                    .build(),
            )
            .await?;

        tracing::debug!(database = %self.database.name(), "MongoDB indexes ensured");
        Ok(())
    }
}

#[async_trait]
impl UserStore for MongoPersistenceClient {
    async fn create_user(&self, user: User) -> Result<User> {
        let mongo_user: MongoUser = user.into();
        Ok(self.user_repo.insert(mongo_user).await?.into())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let object_id = parse_object_id(user_id)?;
        Ok(self.user_repo.find_by_id(object_id).await?.map(Into::into))
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        Ok(self.user_repo.find_by_phone(phone).await?.map(Into::into))
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let object_id = parse_object_id(user_id)?;
        self.user_repo.update_password(object_id, password_hash).await
    }

    async fn check_and_deduct_usage(
        &self,
        user_id: &str,
        kind: UsageKind,
        limits: &UsageLimits,
        now: DateTime<Utc>,
    ) -> Result<UsageOutcome> {
        let object_id = parse_object_id(user_id)?;
        self.user_repo
            .check_and_deduct_usage(object_id, kind, limits.limit(kind), now)
            .await
    }

    async fn refund_usage(&self, user_id: &str, kind: UsageKind, now: DateTime<Utc>) -> Result<()> {
        let object_id = parse_object_id(user_id)?;
        self.user_repo.refund_usage(object_id, kind, now).await
    }

    async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MongoPersistenceClient {
    async fn create_session(&self, user_id: &str, title: Option<String>) -> Result<ChatSession> {
        let object_id = parse_object_id(user_id)?;
        self.session_repo.create_session(object_id, ChatSession::new(title)).await
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let object_id = parse_object_id(user_id)?;
        self.session_repo.list_sessions(object_id).await
    }

    async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<ChatSession>> {
        let object_id = parse_object_id(user_id)?;
        self.session_repo.get_session(object_id, session_id).await
    }

    async fn rename_session(&self, user_id: &str, session_id: &str, title: &str) -> Result<bool> {
        let object_id = parse_object_id(user_id)?;
        self.session_repo.rename_session(object_id, session_id, title).await
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool> {
        let object_id = parse_object_id(user_id)?;
        self.session_repo.delete_session(object_id, session_id).await
    }

    async fn append_message(&self, user_id: &str, session_id: &str, message: ChatMessage) -> Result<bool> {
        let object_id = parse_object_id(user_id)?;
        self.session_repo.append_message(object_id, session_id, message).await
    }
}

#[async_trait]
impl NotebookStore for MongoPersistenceClient {
    async fn create_category(&self, user_id: &str, name: &str) -> Result<Category> {
        let object_id = parse_object_id(user_id)?;
        self.notebook_repo.create_category(object_id, name).await
    }

    async fn list_categories(&self, user_id: &str) -> Result<Vec<Category>> {
        let object_id = parse_object_id(user_id)?;
        self.notebook_repo.list_categories(object_id).await
    }

    async fn delete_category(&self, user_id: &str, category_id: &str) -> Result<bool> {
        let object_id = parse_object_id(user_id)?;
        self.notebook_repo.delete_category(object_id, category_id).await
    }

    async fn add_note(&self, user_id: &str, note: NewNote) -> Result<Note> {
        let object_id = parse_object_id(user_id)?;
        self.notebook_repo.add_note(object_id, note).await
    }

    async fn list_notes(&self, user_id: &str, category_id: Option<&str>) -> Result<Vec<Note>> {
        let object_id = parse_object_id(user_id)?;
        self.notebook_repo.list_notes(object_id, category_id).await
    }

    async fn update_note(&self, user_id: &str, note_id: &str, update: NoteUpdate) -> Result<Option<Note>> {
        let object_id = parse_object_id(user_id)?;
        self.notebook_repo.update_note(object_id, note_id, update).await
    }

    async fn delete_note(&self, user_id: &str, note_id: &str) -> Result<bool> {
        let object_id = parse_object_id(user_id)?;
        self.notebook_repo.delete_note(object_id, note_id).await
    }
}

#[async_trait]
impl OrderStore for MongoPersistenceClient {
    async fn create_order(&self, order: Order) -> Result<Order> {
        let mongo_order: MongoOrder = order.into();
        Ok(self.order_repo.insert(mongo_order).await?.into())
    }

    async fn find_order(&self, out_trade_no: &str) -> Result<Option<Order>> {
        Ok(self.order_repo.find_by_out_trade_no(out_trade_no).await?.map(Into::into))
    }

    async fn mark_order_paid(
        &self,
        out_trade_no: &str,
        trade_no: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        Ok(self
            .order_repo
            .mark_paid(out_trade_no, trade_no, paid_at)
            .await?
            .map(Into::into))
    }

    async fn activate_membership(
        &self,
        user_id: &str,
        plan: MembershipPlan,
        now: DateTime<Utc>,
    ) -> Result<Membership> {
        let object_id = parse_object_id(user_id)?;
        self.user_repo.activate_membership(object_id, plan, now).await
    }

    async fn fulfil_order(&self, order: &Order, now: DateTime<Utc>) -> Result<Option<Membership>> {
        let object_id = parse_object_id(&order.user_id)?;
        self.user_repo
            .apply_order(object_id, &order.out_trade_no, order.plan, now)
            .await
    }
}

#[async_trait]
impl VerificationStore for MongoPersistenceClient {
    async fn save_code(&self, code: VerificationCode) -> Result<()> {
        self.verification_repo.save(code.into()).await
    }

    async fn latest_code(&self, phone: &str, purpose: CodePurpose) -> Result<Option<VerificationCode>> {
        Ok(self.verification_repo.find(phone, purpose).await?.map(Into::into))
    }

    async fn consume_code(
        &self,
        phone: &str,
        purpose: CodePurpose,
        code: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<CodeCheck> {
        self.verification_repo
            .consume(phone, purpose, code, now, max_attempts)
            .await
    }
}
