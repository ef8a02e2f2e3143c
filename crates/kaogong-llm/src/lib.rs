pub mod types;
pub mod traits;
pub mod streaming;
pub mod buffer_utils;
pub mod json_stream;
pub mod openai;
pub mod gemini;
pub mod config;

pub use traits::{ChatClient, ChatRequest, ChatResponse, ChatOptions, TokenUsage};

pub use streaming::StreamEvent;
pub use buffer_utils::{parse_sse_stream, LineBuffer, SseLineParser};
pub use json_stream::JsonArrayDecoder;
pub use openai::OpenAIClient;
pub use gemini::GeminiClient;
pub use config::{ClientFactory, ProviderConfig, ProviderType};
pub use types::Message;
