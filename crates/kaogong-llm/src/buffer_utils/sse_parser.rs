use anyhow::Result;
use futures::{Stream, StreamExt};
use reqwest::Response;
use std::fmt::Display;

use super::buffering::LineBuffer;
use crate::traits::EventStream;
use crate::StreamEvent;

/// Strategy for turning one SSE `data` payload into stream events
pub trait SseLineParser: Send {
    fn parse_data(&self, data: &str) -> Result<Vec<StreamEvent>>;

    /// Check if this payload signals end of stream
    fn is_done_marker(&self, data: &str) -> bool {
        data == "[DONE]"
    }
}

pub fn parse_sse_response<P: SseLineParser + 'static>(response: Response, parser: P) -> EventStream {
    parse_sse_stream(response.bytes_stream(), parser)
}

/// Generic SSE decoder over any byte stream.
///
/// `data:` lines are joined until the blank line that ends the event. Exactly
/// one `Done` is yielded: the first one produced by the parser, the done
/// marker, or a synthetic one when the upstream closes without either.
pub fn parse_sse_stream<S, B, E, P>(bytes: S, parser: P) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
    P: SseLineParser + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer = LineBuffer::with_capacity(8192);
        let mut data = String::new();
        let mut done = false;
        let mut closed = false;

        'outer: while let Some(chunk_result) = byte_chunks.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {}", e));
                    done = true;
                    closed = true;
                    break;
                }
            };
            buffer.extend(bytes.as_ref());

            while let Some(line_result) = buffer.next_line() {
                let line = match line_result {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(e);
                        continue;
                    }
                };

                if !line.is_empty() {
                    push_field(&mut data, &line);
                    continue;
                }
                if data.is_empty() {
                    continue;
                }

                let payload = std::mem::take(&mut data);
                if parser.is_done_marker(&payload) {
                    closed = true;
                    break 'outer;
                }
                match parser.parse_data(&payload) {
                    Ok(events) => {
                        for event in events {
                            if event.is_done() {
                                if done {
                                    continue;
                                }
                                done = true;
                            }
                            yield Ok(event);
                        }
                    }
                    Err(e) => yield Err(e),
                }
            }
        }

        // Upstream may close without the trailing blank line
        if !closed {
            if let Some(Ok(line)) = buffer.take_remainder() {
                push_field(&mut data, &line);
            }
        }
        if !closed && !data.is_empty() && !parser.is_done_marker(&data) {
            match parser.parse_data(&data) {
                Ok(events) => {
                    for event in events {
                        if event.is_done() {
                            if done {
                                continue;
                            }
                            done = true;
                        }
                        yield Ok(event);
                    }
                }
                Err(e) => yield Err(e),
            }
        }

        if !done {
            yield Ok(StreamEvent::Done { finish_reason: None });
        }
    })
}

fn push_field(data: &mut String, line: &str) {
    // Comments (":keep-alive") and non-data fields are ignored
    let Some(value) = line.strip_prefix("data:") else {
        return;
    };
    let value = value.strip_prefix(' ').unwrap_or(value);
    if !data.is_empty() {
        data.push('\n');
    }
    data.push_str(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct Echo;

    impl SseLineParser for Echo {
        fn parse_data(&self, data: &str) -> Result<Vec<StreamEvent>> {
            if data == "stop" {
                return Ok(vec![StreamEvent::Done {
                    finish_reason: Some("stop".to_string()),
                }]);
            }
            Ok(vec![StreamEvent::message(data)])
        }
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<StreamEvent> {
        let bytes = stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(c.as_bytes().to_vec())),
        );
        parse_sse_stream(bytes, Echo)
            .map(|e| e.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let events = collect(vec!["data: he", "llo\n\n", "data: world\n\n"]).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::message("hello"),
                StreamEvent::message("world"),
                StreamEvent::Done { finish_reason: None },
            ]
        );
    }

    #[tokio::test]
    async fn test_comments_and_done_marker() {
        let events = collect(vec![": keep-alive\n\n", "data:a\n\n", "data: [DONE]\n\n", "data: late\n\n"]).await;
        assert_eq!(
            events,
            vec![StreamEvent::message("a"), StreamEvent::Done { finish_reason: None }]
        );
    }

    #[tokio::test]
    async fn test_single_done_after_finish_reason() {
        let events = collect(vec!["data: x\n\ndata: stop\n\ndata: [DONE]\n\n"]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            StreamEvent::Done {
                finish_reason: Some("stop".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_unterminated_last_event() {
        let events = collect(vec!["data: tail"]).await;
        assert_eq!(
            events,
            vec![StreamEvent::message("tail"), StreamEvent::Done { finish_reason: None }]
        );
    }
}
