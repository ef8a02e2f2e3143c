use kaogong_types::{QuestionType, QuizRequest};

/// Instruction for the quiz generator. JSON output mode only admits an
/// object, so the questions are wrapped as `{"questions": [...]}` and relayed
/// from that array as they complete.
pub fn quiz_instruction(request: &QuizRequest) -> String {
    let answer_format = match request.question_type {
        QuestionType::SingleChoice => "answer 为唯一正确选项的字母，如 \"B\"",
        QuestionType::MultipleChoice => "answer 为全部正确选项的字母，如 \"ACD\"",
        QuestionType::TrueFalse => "options 为空数组，answer 为 \"正确\" 或 \"错误\"",
    };
    format!(
        "请围绕“{topic}”出 {count} 道{difficulty}难度的{kind}，题目风格贴近公务员考试。\n\
         只输出一个 JSON 对象，不要输出任何其他文字。格式为 {{\"questions\": [...]}}，\
         questions 数组的每个元素格式为：\n\
         {{\"question\": \"题干\", \"options\": [\"A. ...\", \"B. ...\"], \"answer\": \"...\", \"explanation\": \"解析\"}}\n\
         其中 {answer_format}。",
        topic = request.topic.trim(),
        count = request.count,
        difficulty = request.difficulty.label(),
        kind = request.question_type.label(),
        answer_format = answer_format,
    )
}

/// Session title derived from the first question asked in it
pub fn title_from_message(content: &str) -> String {
    const MAX_TITLE_CHARS: usize = 20;
    let line = content.trim().lines().next().unwrap_or_default().trim();
    line.chars().take(MAX_TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaogong_types::Difficulty;

    #[test]
    fn test_quiz_instruction_mentions_request() {
        let request = QuizRequest {
            topic: "资料分析".into(),
            question_type: QuestionType::TrueFalse,
            count: 3,
            difficulty: Difficulty::Hard,
        };
        let text = quiz_instruction(&request);
        assert!(text.contains("资料分析"));
        assert!(text.contains("3 道困难难度的判断题"));
        assert!(text.contains("JSON 对象"));
        assert!(text.contains("{\"questions\": [...]}"));
    }

    #[test]
    fn test_title_is_first_line_truncated() {
        assert_eq!(title_from_message("  行测\n第二行"), "行测");
        let long = "这是一个非常非常非常非常非常非常非常长的问题标题";
        assert_eq!(title_from_message(long).chars().count(), 20);
    }
}
