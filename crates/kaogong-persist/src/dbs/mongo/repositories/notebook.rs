use bson::{doc, oid::ObjectId};
use mongodb::{Client, Collection};

use crate::dbs::mongo::models::{CategoriesField, MongoUser, NotesField};
use crate::error::{PersistError, Result};
use crate::models::{Category, NewNote, Note, NoteUpdate};

#[derive(Clone)]
pub struct MongoNotebookRepository {
    collection: Collection<MongoUser>,
}

impl MongoNotebookRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("users");
        Self { collection }
    }

    async fn user_exists(&self, user_id: ObjectId) -> Result<bool> {
        Ok(self.collection.count_documents(doc! { "_id": user_id }).await? > 0)
    }

    async fn has_category(&self, user_id: ObjectId, category_id: &str) -> Result<bool> {
        let count = self
            .collection
            .count_documents(doc! { "_id": user_id, "categories.id": category_id })
            .await?;
        Ok(count > 0)
    }

    pub async fn create_category(&self, user_id: ObjectId, name: &str) -> Result<Category> {
        let category = Category::new(name);
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id, "categories.name": { "$ne": name } },
                doc! { "$push": { "categories": bson::to_bson(&category)? } },
            )
            .await?;
        if result.matched_count == 0 {
            if self.user_exists(user_id).await? {
                return Err(PersistError::Conflict(format!("category {}", name)));
            }
            return Err(PersistError::NotFound(format!("user {}", user_id.to_hex())));
        }
        Ok(category)
    }

    pub async fn list_categories(&self, user_id: ObjectId) -> Result<Vec<Category>> {
        let found = self
            .collection
            .clone_with_type::<CategoriesField>()
            .find_one(doc! { "_id": user_id })
            .projection(doc! { "categories": 1 })
            .await?
            .ok_or_else(|| PersistError::NotFound(format!("user {}", user_id.to_hex())))?;
        Ok(found.categories)
    }

    /// Removes the category and clears it from every note filed under it
    pub async fn delete_category(&self, user_id: ObjectId, category_id: &str) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id },
                doc! { "$pull": { "categories": { "id": category_id } } },
            )
            .await?;
        if result.modified_count == 0 {
            return Ok(false);
        }
        self.collection
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "notes.$[n].category_id": null } },
            )
            .array_filters(vec![doc! { "n.category_id": category_id }])
            .await?;
        Ok(true)
    }

    pub async fn add_note(&self, user_id: ObjectId, note: NewNote) -> Result<Note> {
        let mut filter = doc! { "_id": user_id };
        if let Some(category_id) = note.category_id.as_deref() {
            filter.insert("categories.id", category_id);
        }
        let category_id = note.category_id.clone();
        let note = note.into_note();
        let result = self
            .collection
            .update_one(filter, doc! { "$push": { "notes": bson::to_bson(&note)? } })
            .await?;
        if result.matched_count == 0 {
            return Err(match category_id {
                Some(id) if self.user_exists(user_id).await? => PersistError::NotFound(format!("category {}", id)),
                _ => PersistError::NotFound(format!("user {}", user_id.to_hex())),
            });
        }
        Ok(note)
    }

    pub async fn list_notes(&self, user_id: ObjectId, category_id: Option<&str>) -> Result<Vec<Note>> {
        let found = self
            .collection
            .clone_with_type::<NotesField>()
            .find_one(doc! { "_id": user_id })
            .projection(doc! { "notes": 1 })
            .await?
            .ok_or_else(|| PersistError::NotFound(format!("user {}", user_id.to_hex())))?;
        let mut notes: Vec<Note> = found
            .notes
            .into_iter()
            .filter(|n| category_id.is_none() || n.category_id.as_deref() == category_id)
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    pub async fn update_note(&self, user_id: ObjectId, note_id: &str, update: NoteUpdate) -> Result<Option<Note>> {
        if let Some(category_id) = update.category_id.as_deref() {
            if !update.clear_category && !self.has_category(user_id, category_id).await? {
                return Err(PersistError::NotFound(format!("category {}", category_id)));
            }
        }
        let found = self
            .collection
            .clone_with_type::<NotesField>()
            .find_one(doc! { "_id": user_id, "notes.id": note_id })
            .projection(doc! { "notes.$": 1 })
            .await?;
        let Some(mut note) = found.and_then(|f| f.notes.into_iter().next()) else {
            return Ok(None);
        };
        update.apply(&mut note);
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id, "notes.id": note_id },
                doc! { "$set": { "notes.$": bson::to_bson(&note)? } },
            )
            .await?;
        Ok((result.matched_count > 0).then_some(note))
    }

    pub async fn delete_note(&self, user_id: ObjectId, note_id: &str) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id },
                doc! { "$pull": { "notes": { "id": note_id } } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }
}
