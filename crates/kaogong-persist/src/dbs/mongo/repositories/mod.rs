pub mod user;
pub mod session;
pub mod notebook;
pub mod order;
pub mod verification;

pub use user::MongoUserRepository;
pub use session::MongoSessionRepository;
pub use notebook::MongoNotebookRepository;
pub use order::MongoOrderRepository;
pub use verification::MongoVerificationRepository;
