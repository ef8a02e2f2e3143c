use bson::doc;
use chrono::{DateTime, Utc};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};

use crate::dbs::mongo::models::{is_duplicate_key, MongoOrder};
use crate::error::{PersistError, Result};
use crate::models::OrderStatus;

#[derive(Clone)]
pub struct MongoOrderRepository {
    collection: Collection<MongoOrder>,
}

impl MongoOrderRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("orders");
        Self { collection }
    }

    pub fn collection(&self) -> &Collection<MongoOrder> {
        &self.collection
    }

    pub async fn insert(&self, order: MongoOrder) -> Result<MongoOrder> {
        match self.collection.insert_one(&order).await {
            Ok(_) => Ok(order),
            Err(e) if is_duplicate_key(&e) => {
                Err(PersistError::Conflict(format!("order {}", order.out_trade_no)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_out_trade_no(&self, out_trade_no: &str) -> Result<Option<MongoOrder>> {
        Ok(self.collection.find_one(doc! { "out_trade_no": out_trade_no }).await?)
    }

    /// Only a pending order matches, so duplicate notifications are no-ops
    pub async fn mark_paid(
        &self,
        out_trade_no: &str,
        trade_no: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<MongoOrder>> {
        let order = self
            .collection
            .find_one_and_update(
                doc! {
                    "out_trade_no": out_trade_no,
                    "status": bson::to_bson(&OrderStatus::Pending)?,
                },
                doc! { "$set": {
                    "status": bson::to_bson(&OrderStatus::Paid)?,
                    "trade_no": trade_no,
                    "paid_at": bson::to_bson(&paid_at)?,
                } },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(order)
    }
}
