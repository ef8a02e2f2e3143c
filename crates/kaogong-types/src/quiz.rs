use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_QUESTIONS: u32 = 20;
pub const MAX_TOPIC_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
}

impl QuestionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SingleChoice => "单项选择题",
            Self::MultipleChoice => "多项选择题",
            Self::TrueFalse => "判断题",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Easy => "简单",
            Self::Medium => "中等",
            Self::Hard => "困难",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizRequest {
    pub topic: String,
    pub question_type: QuestionType,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
}

fn default_count() -> u32 {
    5
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizValidationError {
    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("topic must be at most {} characters", MAX_TOPIC_CHARS)]
    TopicTooLong,

    #[error("count must be between 1 and {}", MAX_QUESTIONS)]
    CountOutOfRange,
}

impl QuizRequest {
    pub fn validate(&self) -> Result<(), QuizValidationError> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err(QuizValidationError::EmptyTopic);
        }
        if topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(QuizValidationError::TopicTooLong);
        }
        if self.count == 0 || self.count > MAX_QUESTIONS {
            return Err(QuizValidationError::CountOutOfRange);
        }
        Ok(())
    }
}

/// One generated question as the model is asked to emit it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Option letters ("A", "AC") or "正确"/"错误" for true/false
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

impl QuizQuestion {
    /// Shape check before a question is forwarded to the learner
    pub fn is_well_formed(&self, question_type: QuestionType) -> bool {
        if self.question.trim().is_empty() || self.answer.trim().is_empty() {
            return false;
        }
        let letters = || {
            self.answer
                .trim()
                .chars()
                .filter(|c| !c.is_whitespace() && !matches!(*c, ',' | '，' | '、'))
        };
        let within_options = |c: char| {
            let idx = (c.to_ascii_uppercase() as u32).wrapping_sub('A' as u32) as usize;
            c.is_ascii_alphabetic() && idx < self.options.len()
        };
        match question_type {
            QuestionType::SingleChoice => {
                self.options.len() >= 2 && letters().count() == 1 && letters().all(within_options)
            }
            QuestionType::MultipleChoice => {
                self.options.len() >= 2 && letters().count() >= 1 && letters().all(within_options)
            }
            QuestionType::TrueFalse => {
                let verdicts: Vec<&str> = self.options.iter().map(|o| o.trim()).collect();
                let verdict_options = verdicts.len() == 2
                    && TRUE_FALSE_ANSWERS.iter().all(|a| verdicts.contains(a));
                TRUE_FALSE_ANSWERS.contains(&self.answer.trim())
                    && (verdicts.is_empty() || verdict_options)
            }
        }
    }
}

/// Only answers a true/false question may carry
const TRUE_FALSE_ANSWERS: [&str; 2] = ["正确", "错误"];

#[cfg(test)]
mod tests {
    use super::*;

    fn request(topic: &str, count: u32) -> QuizRequest {
        QuizRequest {
            topic: topic.to_string(),
            question_type: QuestionType::SingleChoice,
            count,
            difficulty: Difficulty::Medium,
        }
    }

    #[test]
    fn test_validation() {
        assert!(request("资料分析", 5).validate().is_ok());
        assert_eq!(request("   ", 5).validate(), Err(QuizValidationError::EmptyTopic));
        assert_eq!(request("言语", 0).validate(), Err(QuizValidationError::CountOutOfRange));
        assert_eq!(request("言语", 21).validate(), Err(QuizValidationError::CountOutOfRange));
        assert_eq!(
            request(&"题".repeat(101), 1).validate(),
            Err(QuizValidationError::TopicTooLong)
        );
    }

    #[test]
    fn test_request_defaults() {
        let req: QuizRequest =
            serde_json::from_str(r#"{"topic":"数量关系","question_type":"true_false"}"#).unwrap();
        assert_eq!(req.count, 5);
        assert_eq!(req.difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_well_formed_choice_questions() {
        let q = QuizQuestion {
            question: "下列说法正确的是".to_string(),
            options: vec!["A. 甲".into(), "B. 乙".into(), "C. 丙".into(), "D. 丁".into()],
            answer: "B".to_string(),
            explanation: String::new(),
        };
        assert!(q.is_well_formed(QuestionType::SingleChoice));

        let multi = QuizQuestion {
            answer: "A、C".to_string(),
            ..q.clone()
        };
        assert!(!multi.is_well_formed(QuestionType::SingleChoice));
        assert!(multi.is_well_formed(QuestionType::MultipleChoice));

        let out_of_range = QuizQuestion {
            answer: "E".to_string(),
            ..q.clone()
        };
        assert!(!out_of_range.is_well_formed(QuestionType::SingleChoice));

        let no_options = QuizQuestion {
            options: vec![],
            ..q
        };
        assert!(!no_options.is_well_formed(QuestionType::MultipleChoice));
    }

    #[test]
    fn test_true_false_needs_answer_only() {
        let q: QuizQuestion =
            serde_json::from_str(r#"{"question":"宪法是根本法","answer":"正确"}"#).unwrap();
        assert!(q.is_well_formed(QuestionType::TrueFalse));
        assert!(q.explanation.is_empty());
    }

    #[test]
    fn test_true_false_rejects_choice_shape() {
        let lettered = QuizQuestion {
            question: "宪法是根本法".into(),
            options: vec!["A. 对".into(), "B. 错".into(), "C. 不确定".into(), "D. 无".into()],
            answer: "A".into(),
            explanation: String::new(),
        };
        assert!(!lettered.is_well_formed(QuestionType::TrueFalse));

        let unknown_answer = QuizQuestion {
            options: vec![],
            answer: "对".into(),
            ..lettered.clone()
        };
        assert!(!unknown_answer.is_well_formed(QuestionType::TrueFalse));

        let stray_options = QuizQuestion {
            options: vec!["正确".into(), "不一定".into()],
            answer: "正确".into(),
            ..lettered.clone()
        };
        assert!(!stray_options.is_well_formed(QuestionType::TrueFalse));

        let verdict_options = QuizQuestion {
            options: vec![" 正确".into(), "错误".into()],
            answer: "错误 ".into(),
            ..lettered
        };
        assert!(verdict_options.is_well_formed(QuestionType::TrueFalse));
    }
}
