pub mod payment;
pub mod prompts;
pub mod sms;
pub mod tokens;
