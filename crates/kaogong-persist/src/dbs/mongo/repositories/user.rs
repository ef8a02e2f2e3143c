use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use kaogong_types::{china_day, MembershipPlan, UsageKind};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};

use crate::dbs::mongo::models::{is_duplicate_key, profile_projection, MongoUser, ProfileFields};
use crate::error::{PersistError, Result};
use crate::models::{Membership, UsageOutcome};

/// Activation retries when a concurrent renewal changed the membership
const MEMBERSHIP_RETRIES: usize = 5;

#[derive(Clone)]
pub struct MongoUserRepository {
    collection: Collection<MongoUser>,
}

impl MongoUserRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("users");
        Self { collection }
    }

    pub fn collection(&self) -> &Collection<MongoUser> {
        &self.collection
    }

    pub async fn insert(&self, user: MongoUser) -> Result<MongoUser> {
        match self.collection.insert_one(&user).await {
            Ok(_) => Ok(user),
            Err(e) if is_duplicate_key(&e) => Err(PersistError::Conflict(format!("phone {}", user.phone))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id(&self, id: ObjectId) -> Result<Option<MongoUser>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id })
            .projection(profile_projection())
            .await?)
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<MongoUser>> {
        Ok(self
            .collection
            .find_one(doc! { "phone": phone })
            .projection(profile_projection())
            .await?)
    }

    pub async fn update_password(&self, id: ObjectId, password_hash: &str) -> Result<()> {
        let result = self
            .collection
            .update_one(doc! { "_id": id }, doc! { "$set": { "password_hash": password_hash } })
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::NotFound(format!("user {}", id.to_hex())));
        }
        Ok(())
    }

    async fn profile_fields(&self, id: ObjectId) -> Result<ProfileFields> {
        self.collection
            .clone_with_type::<ProfileFields>()
            .find_one(doc! { "_id": id })
            .projection(doc! { "membership": 1, "usage": 1 })
            .await?
            .ok_or_else(|| PersistError::NotFound(format!("user {}", id.to_hex())))
    }

    /// Reset-then-increment with conditional filters. The increment only
    /// matches while the counter is below the limit, so the limit holds
    /// under concurrent requests.
    pub async fn check_and_deduct_usage(
        &self,
        id: ObjectId,
        kind: UsageKind,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<UsageOutcome> {
        let profile = self.profile_fields(id).await?;
        if profile.membership.as_ref().is_some_and(|m| m.is_active(now)) {
            return Ok(UsageOutcome::Unlimited);
        }

        let today = china_day(now);
        let field = format!("usage.{}", kind.field());

        self.collection
            .update_one(
                doc! { "_id": id, "usage.day": { "$ne": today.as_str() } },
                doc! { "$set": { "usage": { "day": today.as_str(), "chat": 0_i64, "quiz": 0_i64 } } },
            )
            .await?;

        let mut filter = doc! { "_id": id, "usage.day": today.as_str() };
        filter.insert(field.clone(), doc! { "$lt": i64::from(limit) });
        let mut inc = Document::new();
        inc.insert(field, 1_i64);

        let updated = self
            .collection
            .clone_with_type::<ProfileFields>()
            .find_one_and_update(filter, doc! { "$inc": inc })
            .projection(doc! { "membership": 1, "usage": 1 })
            .return_document(ReturnDocument::After)
            .await?;

        Ok(match updated {
            Some(profile) => UsageOutcome::Allowed {
                remaining: limit.saturating_sub(profile.usage.used(kind, &today)),
            },
            None => UsageOutcome::Exhausted { limit },
        })
    }

    pub async fn refund_usage(&self, id: ObjectId, kind: UsageKind, now: DateTime<Utc>) -> Result<()> {
        let today = china_day(now);
        let field = format!("usage.{}", kind.field());
        let mut filter = doc! { "_id": id, "usage.day": today.as_str() };
        filter.insert(field.clone(), doc! { "$gt": 0_i64 });
        let mut inc = Document::new();
        inc.insert(field, -1_i64);
        self.collection.update_one(filter, doc! { "$inc": inc }).await?;
        Ok(())
    }

    /// Compare-and-set on the previous membership value
    pub async fn activate_membership(
        &self,
        id: ObjectId,
        plan: MembershipPlan,
        now: DateTime<Utc>,
    ) -> Result<Membership> {
        for _ in 0..MEMBERSHIP_RETRIES {
            let current = self.profile_fields(id).await?.membership;
            let next = next_membership(current.as_ref(), plan, now);
            if self.swap_membership(id, &current, &next, None).await? {
                return Ok(next);
            }
            tracing::debug!(user_id = %id.to_hex(), "membership changed concurrently, retrying");
        }
        Err(membership_contended(id))
    }

    /// Same compare-and-set, additionally guarded by `fulfilled_orders` so
    /// an order is applied at most once
    pub async fn apply_order(
        &self,
        id: ObjectId,
        out_trade_no: &str,
        plan: MembershipPlan,
        now: DateTime<Utc>,
    ) -> Result<Option<Membership>> {
        for _ in 0..MEMBERSHIP_RETRIES {
            let current = self.profile_fields(id).await?.membership;
            let next = next_membership(current.as_ref(), plan, now);
            if self.swap_membership(id, &current, &next, Some(out_trade_no)).await? {
                return Ok(Some(next));
            }
            let applied = self
                .collection
                .count_documents(doc! { "_id": id, "fulfilled_orders": out_trade_no })
                .await?;
            if applied > 0 {
                return Ok(None);
            }
            tracing::debug!(user_id = %id.to_hex(), "membership changed concurrently, retrying");
        }
        Err(membership_contended(id))
    }

    async fn swap_membership(
        &self,
        id: ObjectId,
        current: &Option<Membership>,
        next: &Membership,
        out_trade_no: Option<&str>,
    ) -> Result<bool> {
        let mut filter = doc! { "_id": id, "membership": bson::to_bson(current)? };
        let mut update = doc! { "$set": { "membership": bson::to_bson(next)? } };
        if let Some(out_trade_no) = out_trade_no {
            filter.insert("fulfilled_orders", doc! { "$ne": out_trade_no });
            update.insert("$addToSet", doc! { "fulfilled_orders": out_trade_no });
        }
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count == 1)
    }
}

fn next_membership(current: Option<&Membership>, plan: MembershipPlan, now: DateTime<Utc>) -> Membership {
    Membership {
        plan,
        expires_at: plan.extend_expiry(current.map(|m| m.expires_at), now),
    }
}

fn membership_contended(id: ObjectId) -> PersistError {
    PersistError::Internal(format!(
        "membership for user {} kept changing during activation",
        id.to_hex()
    ))
}
