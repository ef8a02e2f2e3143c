mod client;

pub use client::{ChatChunkParser, OpenAIClient};
