pub mod chat_stream;
pub mod quiz_stream;

use axum::response::sse::Event;
use serde_json::Value;

/// Named SSE event with a JSON payload
pub(crate) fn sse_event(name: &str, data: Value) -> Event {
    Event::default().event(name).data(data.to_string())
}
