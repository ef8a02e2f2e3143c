pub mod plan;
pub mod usage;
pub mod quiz;

pub use plan::{format_yuan, parse_yuan, MembershipPlan, PlanInfo};
pub use usage::{china_day, UsageCounter, UsageDecision, UsageKind, UsageLimits};
pub use quiz::{Difficulty, QuestionType, QuizQuestion, QuizRequest, QuizValidationError};
