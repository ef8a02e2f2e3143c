//! Incremental decoding of a JSON array that arrives as text deltas.
//!
//! Quiz generation asks the model for a `{"questions": [...]}` object. Waiting
//! for the whole document would hold every question back until the last one
//! is written, so the decoder scans deltas and releases each top-level object
//! of the first array the moment its closing brace arrives.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the opening `[`. Prose, code fences and wrapper keys are skipped.
    Searching,
    InArray,
    Closed,
}

#[derive(Debug)]
pub struct JsonArrayDecoder {
    state: State,
    depth: usize,
    in_string: bool,
    escaped: bool,
    capturing: bool,
    current: String,
    skipped: usize,
}

impl Default for JsonArrayDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonArrayDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Searching,
            depth: 0,
            in_string: false,
            escaped: false,
            capturing: false,
            current: String::new(),
            skipped: 0,
        }
    }

    /// Feed a text delta; returns the objects completed by it, in order.
    pub fn push(&mut self, delta: &str) -> Vec<Value> {
        let mut completed = Vec::new();

        for ch in delta.chars() {
            match self.state {
                State::Closed => break,
                State::Searching => self.search(ch),
                State::InArray => {
                    if let Some(value) = self.step(ch) {
                        completed.push(value);
                    }
                }
            }
        }

        completed
    }

    /// Look for the opening `[`. Inside a wrapper object, string values are
    /// skipped so a bracket in e.g. a title does not start the array.
    fn search(&mut self, ch: char) {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return;
        }

        match ch {
            '"' if self.depth > 0 => self.in_string = true,
            '{' => self.depth += 1,
            '}' => self.depth = self.depth.saturating_sub(1),
            '[' => {
                self.state = State::InArray;
                self.depth = 0;
            }
            _ => {}
        }
    }

    fn step(&mut self, ch: char) -> Option<Value> {
        if self.in_string {
            if self.capturing {
                self.current.push(ch);
            }
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return None;
        }

        match ch {
            '"' => {
                self.in_string = true;
                if self.capturing {
                    self.current.push(ch);
                }
                None
            }
            '{' | '[' => {
                if self.depth == 0 {
                    // Only object elements are captured; arrays and scalars are skipped
                    self.capturing = ch == '{';
                    self.current.clear();
                }
                self.depth += 1;
                if self.capturing {
                    self.current.push(ch);
                }
                None
            }
            '}' | ']' => {
                if self.depth == 0 {
                    if ch == ']' {
                        self.state = State::Closed;
                    }
                    return None;
                }
                self.depth -= 1;
                if self.capturing {
                    self.current.push(ch);
                }
                if self.depth == 0 && self.capturing {
                    self.capturing = false;
                    let raw = std::mem::take(&mut self.current);
                    return match serde_json::from_str::<Value>(&raw) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            self.skipped += 1;
                            tracing::warn!(error = %e, "Skipping malformed array element");
                            None
                        }
                    };
                }
                None
            }
            _ => {
                if self.capturing {
                    self.current.push(ch);
                }
                None
            }
        }
    }

    /// True once the closing `]` of the array has been seen
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// True once the opening `[` has been seen
    pub fn has_started(&self) -> bool {
        self.state != State::Searching
    }

    /// Elements that looked like objects but failed to parse
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(decoder: &mut JsonArrayDecoder, text: &str, step: usize) -> Vec<Value> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = Vec::new();
        for chunk in chars.chunks(step) {
            let delta: String = chunk.iter().collect();
            out.extend(decoder.push(&delta));
        }
        out
    }

    #[test]
    fn test_objects_released_as_they_close() {
        let mut decoder = JsonArrayDecoder::new();
        assert!(decoder.push("[{\"q\": \"1\"}, {\"q\"").len() == 1);
        assert!(!decoder.is_closed());
        let rest = decoder.push(": \"2\"}]");
        assert_eq!(rest, vec![json!({"q": "2"})]);
        assert!(decoder.is_closed());
    }

    #[test]
    fn test_fence_wrapper_and_tricky_strings() {
        let text = "好的，以下是题目：\n```json\n{\"questions\": [\n  {\"question\": \"括号 {不} 算 [数]\", \"answer\": \"A\"},\n  {\"question\": \"引号 \\\"转义\\\" 以及 \\\\\", \"answer\": \"B\"}\n]}\n```";
        for step in [1, 3, 7, 100] {
            let mut decoder = JsonArrayDecoder::new();
            let values = feed(&mut decoder, text, step);
            assert_eq!(values.len(), 2, "step {}", step);
            assert_eq!(values[0]["question"], "括号 {不} 算 [数]");
            assert_eq!(values[1]["question"], "引号 \"转义\" 以及 \\");
            assert!(decoder.is_closed());
        }
    }

    #[test]
    fn test_brackets_in_wrapper_strings_ignored() {
        let text = r#"{"title": "[资料分析] 练习", "note": "含 \"[引号]\" 的说明", "questions": [{"question": "q1", "answer": "A"}]}"#;
        for step in [1, 2, 5, 100] {
            let mut decoder = JsonArrayDecoder::new();
            let values = feed(&mut decoder, text, step);
            assert_eq!(values, vec![json!({"question": "q1", "answer": "A"})], "step {}", step);
            assert!(decoder.is_closed());
        }
    }

    #[test]
    fn test_nested_values_stay_in_element() {
        let mut decoder = JsonArrayDecoder::new();
        let values = decoder.push(r#"[{"options": ["A. 1", "B. {2}"], "meta": {"k": [1, 2]}}]"#);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["options"][1], "B. {2}");
        assert_eq!(values[0]["meta"]["k"], json!([1, 2]));
    }

    #[test]
    fn test_non_object_elements_skipped_and_text_after_close_ignored() {
        let mut decoder = JsonArrayDecoder::new();
        let values = decoder.push(r#"["x", [1, {"a": 1}], 3, {"b": 2}] [{"c": 3}]"#);
        assert_eq!(values, vec![json!({"b": 2})]);
        assert_eq!(decoder.skipped(), 0);
    }

    #[test]
    fn test_malformed_object_counted() {
        let mut decoder = JsonArrayDecoder::new();
        let values = decoder.push(r#"[{"a": 1,}, {"b": 2}]"#);
        assert_eq!(values, vec![json!({"b": 2})]);
        assert_eq!(decoder.skipped(), 1);
    }

    #[test]
    fn test_truncated_stream_never_closes() {
        let mut decoder = JsonArrayDecoder::new();
        assert!(!decoder.has_started());
        let values = decoder.push(r#"[{"a": 1}, {"b": "#);
        assert_eq!(values.len(), 1);
        assert!(decoder.has_started());
        assert!(!decoder.is_closed());
    }
}
