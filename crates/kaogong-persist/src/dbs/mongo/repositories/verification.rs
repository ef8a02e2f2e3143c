use bson::doc;
use chrono::{DateTime, Utc};
use mongodb::{Client, Collection};

use crate::dbs::mongo::models::MongoVerificationCode;
use crate::error::Result;
use crate::models::{CodeCheck, CodePurpose, VerificationCode};

#[derive(Clone)]
pub struct MongoVerificationRepository {
    collection: Collection<MongoVerificationCode>,
}

impl MongoVerificationRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("verification_codes");
        Self { collection }
    }

    pub fn collection(&self) -> &Collection<MongoVerificationCode> {
        &self.collection
    }

    fn key(phone: &str, purpose: CodePurpose) -> Result<bson::Document> {
        Ok(doc! { "phone": phone, "purpose": bson::to_bson(&purpose)? })
    }

    pub async fn save(&self, code: MongoVerificationCode) -> Result<()> {
        self.collection
            .replace_one(Self::key(&code.phone, code.purpose)?, &code)
            .upsert(true)
            .await?;
        Ok(())
    }

    pub async fn find(&self, phone: &str, purpose: CodePurpose) -> Result<Option<MongoVerificationCode>> {
        Ok(self.collection.find_one(Self::key(phone, purpose)?).await?)
    }

    pub async fn consume(
        &self,
        phone: &str,
        purpose: CodePurpose,
        candidate: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<CodeCheck> {
        let Some(stored) = self.find(phone, purpose).await? else {
            return Ok(CodeCheck::Missing);
        };
        let stored: VerificationCode = stored.into();
        let check = stored.check(candidate, now, max_attempts);
        let mut filter = Self::key(phone, purpose)?;
        filter.insert("code", stored.code.as_str());
        match check {
            CodeCheck::Valid => {
                // Two concurrent logins with the same code: only the one that
                // deletes the document wins.
                let deleted = self.collection.delete_one(filter).await?;
                if deleted.deleted_count == 0 {
                    return Ok(CodeCheck::Missing);
                }
            }
            CodeCheck::Expired => {
                self.collection.delete_one(filter).await?;
            }
            CodeCheck::Mismatch => {
                self.collection
                    .update_one(filter, doc! { "$inc": { "attempts": 1_i64 } })
                    .await?;
            }
            CodeCheck::TooManyAttempts | CodeCheck::Missing => {}
        }
        Ok(check)
    }
}
