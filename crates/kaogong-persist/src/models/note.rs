use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookmarked question in the learner's notebook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub answer: String,
    /// Learner's own annotation
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNote {
    #[serde(default)]
    pub category_id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub content: String,
}

impl NewNote {
    pub fn into_note(self) -> Note {
        let now = Utc::now();
        Note {
            id: uuid::Uuid::new_v4().to_string(),
            category_id: self.category_id,
            question: self.question,
            answer: self.answer,
            content: self.content,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteUpdate {
    #[serde(default)]
    pub category_id: Option<String>,
    /// Move the note out of any category
    #[serde(default)]
    pub clear_category: bool,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl NoteUpdate {
    pub fn apply(self, note: &mut Note) {
        if self.clear_category {
            note.category_id = None;
        } else if let Some(category_id) = self.category_id {
            note.category_id = Some(category_id);
        }
        if let Some(question) = self.question {
            note.question = question;
        }
        if let Some(answer) = self.answer {
            note.answer = answer;
        }
        if let Some(content) = self.content {
            note.content = content;
        }
        note.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
