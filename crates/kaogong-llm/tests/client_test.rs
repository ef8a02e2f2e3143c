use futures::StreamExt;
use kaogong_llm::{ChatClient, ChatOptions, ChatRequest, GeminiClient, Message, OpenAIClient, StreamEvent};
use mockito::Matcher;

async fn collect_text(client: &dyn ChatClient, request: ChatRequest) -> (String, Vec<StreamEvent>) {
    let mut stream = client.chat_stream(request).await.unwrap();
    let mut text = String::new();
    let mut dones = Vec::new();
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            StreamEvent::Message { content } => text.push_str(&content),
            done @ StreamEvent::Done { .. } => dones.push(done),
        }
    }
    (text, dones)
}

#[tokio::test]
async fn test_openai_stream() {
    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"常识\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"判断\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJsonString(r#"{"model":"gpt-4o-mini","stream":true}"#.to_string()))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = OpenAIClient::new("sk-test").unwrap().with_base_url(server.url());
    let request = ChatRequest::new("gpt-4o-mini", vec![Message::human("讲讲常识判断")]);
    let (text, dones) = collect_text(&client, request).await;

    mock.assert_async().await;
    assert_eq!(text, "常识判断");
    assert_eq!(
        dones,
        vec![StreamEvent::Done {
            finish_reason: Some("stop".to_string())
        }]
    );
}

#[tokio::test]
async fn test_openai_error_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"bad key"}}"#)
        .create_async()
        .await;

    let client = OpenAIClient::new("sk-bad").unwrap().with_base_url(server.url());
    let result = client
        .chat_stream(ChatRequest::new("gpt-4o-mini", vec![Message::human("hi")]))
        .await;

    let err = result.err().unwrap().to_string();
    assert!(err.contains("401"));
    assert!(err.contains("bad key"));
}

#[tokio::test]
async fn test_openai_chat_non_streaming() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"x","object":"chat.completion","created":1,"model":"m","choices":[{"index":0,"message":{"role":"assistant","content":"答案是B"},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":3,"total_tokens":8}}"#)
        .create_async()
        .await;

    let client = OpenAIClient::new("sk-test").unwrap().with_base_url(server.url());
    let response = client
        .chat(ChatRequest::new("m", vec![Message::human("?")]))
        .await
        .unwrap();

    assert_eq!(response.content.as_deref(), Some("答案是B"));
    assert_eq!(response.usage.unwrap().total_tokens, 8);
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_gemini_stream_without_done_marker() {
    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"[{\\\"question\\\":\"}],\"role\":\"model\"},\"index\":0}]}\r\n\r\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"\\\"q1\\\"}]\"}],\"role\":\"model\"},\"finishReason\":\"STOP\",\"index\":0}]}\r\n\r\n",
    );
    let mock = server
        .mock("POST", "/models/gemini-2.0-flash:streamGenerateContent")
        .match_query(Matcher::UrlEncoded("alt".into(), "sse".into()))
        .match_header("x-goog-api-key", "g-key")
        .match_body(Matcher::PartialJsonString(
            r#"{"generationConfig":{"responseMimeType":"application/json"}}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = GeminiClient::new("g-key").unwrap().with_base_url(server.url());
    let request = ChatRequest::new("gemini-2.0-flash", vec![Message::human("出一道题")])
        .with_options(ChatOptions::new().json_output(true));
    let (text, dones) = collect_text(&client, request).await;

    mock.assert_async().await;
    assert_eq!(text, r#"[{"question":"q1"}]"#);
    assert_eq!(dones.len(), 1);
}
