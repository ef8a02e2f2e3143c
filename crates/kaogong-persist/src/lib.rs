pub mod models;
pub mod trait_client;
pub mod error;
pub mod dbs;

pub use models::{
    Category, ChatMessage, ChatSession, CodeCheck, CodePurpose, Membership, MessageRole, NewNote,
    Note, NoteUpdate, Order, OrderStatus, SessionSummary, UsageOutcome, User, VerificationCode,
    DEFAULT_SESSION_TITLE,
};
pub use trait_client::{
    NotebookStore, OrderStore, PersistenceClient, SessionStore, UserStore, VerificationStore,
};
pub use error::{PersistError, Result};
pub use dbs::memory::InMemoryPersistenceClient;
#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoPersistenceClient;
