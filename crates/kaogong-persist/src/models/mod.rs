mod user;
mod session;
mod note;
mod order;
mod verification;

// Export database-agnostic models
pub use user::{Membership, UsageOutcome, User};
pub use session::{ChatMessage, ChatSession, MessageRole, SessionSummary, DEFAULT_SESSION_TITLE};
pub use note::{Category, NewNote, Note, NoteUpdate};
pub use order::{Order, OrderStatus};
pub use verification::{CodeCheck, CodePurpose, VerificationCode};
