// Google Gemini client (generateContent / streamGenerateContent)

use crate::buffer_utils::{parse_sse_response, SseLineParser};
use crate::streaming::StreamEvent;
use crate::traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, EventStream, TokenUsage};
use crate::types::Message;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&api_key).context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// System messages are merged into `systemInstruction`; the rest become
    /// `contents` with the assistant role renamed to `model`.
    fn build_request(&self, messages: &[Message], options: &ChatOptions) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.is_system())
            .map(|m| m.content())
            .collect();

        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| !m.is_system())
            .map(|m| {
                let role = match m {
                    Message::AI { .. } => "model",
                    _ => "user",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": m.content() }],
                })
            })
            .collect();

        let mut generation_config = serde_json::Map::new();
        if let Some(temp) = options.temperature {
            generation_config.insert("temperature".to_string(), serde_json::json!(temp));
        }
        if let Some(max_tokens) = options.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), serde_json::json!(max_tokens));
        }
        if options.json_output {
            generation_config.insert(
                "responseMimeType".to_string(),
                serde_json::json!("application/json"),
            );
        }

        let mut request = serde_json::json!({ "contents": contents });
        if let Some(obj) = request.as_object_mut() {
            if !system.is_empty() {
                obj.insert(
                    "systemInstruction".to_string(),
                    serde_json::json!({ "parts": [{ "text": system.join("\n\n") }] }),
                );
            }
            if !generation_config.is_empty() {
                obj.insert("generationConfig".to_string(), Value::Object(generation_config));
            }
        }

        request
    }

    async fn post(&self, url: String, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, error_text);
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatClient for GeminiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let payload = self.build_request(&request.messages, &request.options);
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let response = self.post(url, &payload).await?;

        let raw: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse response")?;

        let candidate = raw.candidates.into_iter().next();
        Ok(ChatResponse {
            content: candidate.as_ref().map(Candidate::text),
            usage: raw.usage_metadata.map(Into::into),
            finish_reason: candidate.and_then(|c| c.finish_reason),
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        let payload = self.build_request(&request.messages, &request.options);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, request.model
        );
        let response = self.post(url, &payload).await?;

        Ok(parse_sse_response(response, GeminiChunkParser))
    }
}

/// Parses streamed `GenerateContentResponse` payloads
pub struct GeminiChunkParser;

impl SseLineParser for GeminiChunkParser {
    fn parse_data(&self, data: &str) -> Result<Vec<StreamEvent>> {
        let chunk: GenerateContentResponse = serde_json::from_str(data)
            .map_err(|e| anyhow::anyhow!("Failed to parse Gemini chunk: {}", e))?;

        if let Some(error) = chunk.error {
            anyhow::bail!("Gemini stream error ({}): {}", error.code, error.message);
        }

        let mut events = Vec::new();
        if let Some(candidate) = chunk.candidates.into_iter().next() {
            let text = candidate.text();
            if !text.is_empty() {
                events.push(StreamEvent::Message { content: text });
            }
            if let Some(finish_reason) = candidate.finish_reason {
                events.push(StreamEvent::Done {
                    finish_reason: Some(finish_reason),
                });
            }
        }
        Ok(events)
    }
}

// ============================================================================
// GEMINI-SPECIFIC RESPONSE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

impl Candidate {
    fn text(&self) -> String {
        self.content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(u: UsageMetadata) -> Self {
        Self {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_maps_roles_and_system() {
        let client = GeminiClient::new("key").unwrap();
        let payload = client.build_request(
            &[
                Message::system("你是申论老师"),
                Message::human("什么是申论"),
                Message::ai("申论是..."),
                Message::human("继续"),
            ],
            &ChatOptions::new().max_tokens(512).json_output(true),
        );

        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "你是申论老师");
        assert_eq!(payload["contents"].as_array().unwrap().len(), 3);
        assert_eq!(payload["contents"][1]["role"], "model");
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], 512);
        assert_eq!(payload["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_chunk_text_and_finish() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"行政"},{"text":"职业能力"}],"role":"model"},"finishReason":"STOP","index":0}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":4,"totalTokenCount":7}}"#;
        let events = GeminiChunkParser.parse_data(data).unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::message("行政职业能力"),
                StreamEvent::Done {
                    finish_reason: Some("STOP".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_error_chunk() {
        let data = r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = GeminiChunkParser.parse_data(data).unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
