mod client;

pub use client::{GeminiChunkParser, GeminiClient};
