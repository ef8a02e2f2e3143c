pub mod auth;
pub mod health;
pub mod me;
pub mod membership;
pub mod notebook;
pub mod payment;
pub mod sessions;
