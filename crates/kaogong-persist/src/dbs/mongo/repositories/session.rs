use bson::{doc, oid::ObjectId};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{Client, Collection};

use crate::dbs::mongo::models::{MongoUser, SessionSummariesField, SessionsField};
use crate::error::{PersistError, Result};
use crate::models::{ChatMessage, ChatSession, SessionSummary};

/// Sessions live in `users.sessions`; updates address them with the
/// positional operator.
#[derive(Clone)]
pub struct MongoSessionRepository {
    collection: Collection<MongoUser>,
}

impl MongoSessionRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("users");
        Self { collection }
    }

    pub async fn create_session(&self, user_id: ObjectId, session: ChatSession) -> Result<ChatSession> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id },
                doc! { "$push": { "sessions": bson::to_bson(&session)? } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::NotFound(format!("user {}", user_id.to_hex())));
        }
        Ok(session)
    }

    /// Summaries are computed server-side so message bodies never leave the
    /// database.
    pub async fn list_sessions(&self, user_id: ObjectId) -> Result<Vec<SessionSummary>> {
        let pipeline = vec![
            doc! { "$match": { "_id": user_id } },
            doc! { "$project": {
                "_id": 0,
                "sessions": { "$map": {
                    "input": { "$ifNull": ["$sessions", []] },
                    "as": "s",
                    "in": {
                        "id": "$$s.id",
                        "title": "$$s.title",
                        "message_count": { "$size": { "$ifNull": ["$$s.messages", []] } },
                        "created_at": "$$s.created_at",
                        "updated_at": "$$s.updated_at",
                    },
                } },
            } },
        ];
        let docs: Vec<bson::Document> = self.collection.aggregate(pipeline).await?.try_collect().await?;
        let Some(first) = docs.into_iter().next() else {
            return Err(PersistError::NotFound(format!("user {}", user_id.to_hex())));
        };
        let mut sessions = bson::from_document::<SessionSummariesField>(first)?.sessions;
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    pub async fn get_session(&self, user_id: ObjectId, session_id: &str) -> Result<Option<ChatSession>> {
        let found = self
            .collection
            .clone_with_type::<SessionsField>()
            .find_one(doc! { "_id": user_id, "sessions.id": session_id })
            .projection(doc! { "sessions.$": 1 })
            .await?;
        Ok(found.and_then(|f| f.sessions.into_iter().next()))
    }

    pub async fn rename_session(&self, user_id: ObjectId, session_id: &str, title: &str) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id, "sessions.id": session_id },
                doc! { "$set": {
                    "sessions.$.title": title,
                    "sessions.$.updated_at": bson::to_bson(&Utc::now())?,
                } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn delete_session(&self, user_id: ObjectId, session_id: &str) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id },
                doc! { "$pull": { "sessions": { "id": session_id } } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    pub async fn append_message(&self, user_id: ObjectId, session_id: &str, message: ChatMessage) -> Result<bool> {
        let updated_at = bson::to_bson(&message.created_at)?;
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id, "sessions.id": session_id },
                doc! {
                    "$push": { "sessions.$.messages": bson::to_bson(&message)? },
                    "$set": { "sessions.$.updated_at": updated_at },
                },
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}
