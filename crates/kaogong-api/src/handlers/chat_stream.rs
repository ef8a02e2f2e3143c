use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use kaogong_llm::{ChatOptions, ChatRequest, Message as LLMMessage, StreamEvent};
use kaogong_persist::{ChatMessage, UsageOutcome, DEFAULT_SESSION_TITLE};
use kaogong_types::UsageKind;

use crate::{
    error::{ApiError, ApiResult},
    handlers::sse_event,
    middleware::auth::AuthUser,
    services::prompts::title_from_message,
    state::AppState,
};

const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Ask the tutor a question and stream the answer using Server-Sent Events
///
/// Events: `message {content}` per text delta, then `done {content_length}`,
/// or `error {error}` if the model fails mid-answer.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/messages",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Streaming response", content_type = "text/event-stream"),
        (status = 404, description = "Session not found"),
        (status = 429, description = "Daily chat quota used up"),
        (status = 502, description = "Model service unavailable")
    ),
    tag = "sessions"
)]
pub async fn send_message_stream(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Sse<ReceiverStream<Result<Event, Infallible>>>> {
    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "message must be 1 to {} characters",
            MAX_MESSAGE_CHARS
        )));
    }

    // 1. Session must exist
    let session = state
        .persist
        .get_session(&auth.user_id, &session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))?;

    // 2. Free quota
    let limits = state.config.usage_limits();
    let outcome = state
        .persist
        .check_and_deduct_usage(&auth.user_id, UsageKind::Chat, &limits, Utc::now())
        .await?;
    if let UsageOutcome::Exhausted { limit } = outcome {
        return Err(ApiError::UsageExhausted { kind: "chat", limit });
    }

    // 3. Store the question; first question names the session
    state
        .persist
        .append_message(&auth.user_id, &session_id, ChatMessage::user(&content))
        .await?;
    if session.title == DEFAULT_SESSION_TITLE {
        let title = title_from_message(&content);
        if let Err(e) = state.persist.rename_session(&auth.user_id, &session_id, &title).await {
            tracing::warn!(session_id = %session_id, "Failed to retitle session: {}", e);
        }
    }

    // 4. System prompt + recent history + the new question
    let llm = &state.config.llm;
    let mut messages = vec![LLMMessage::system(&llm.system_prompt)];
    messages.extend(session.recent_messages(llm.history_limit).iter().map(LLMMessage::from));
    messages.push(LLMMessage::human(&content));

    let request = ChatRequest::new(&llm.model, messages).with_options(
        ChatOptions::new()
            .temperature(llm.temperature)
            .max_tokens(llm.max_output_tokens),
    );

    // 5. Open the upstream stream before answering 200
    let mut upstream = match state.llm_client.chat_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            refund_if_counted(&state, &auth.user_id, UsageKind::Chat, outcome).await;
            return Err(ApiError::Upstream(e));
        }
    };

    // 6. Relay deltas; the task keeps reading after a disconnect so the
    //    answer is still saved
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(64);
    let user_id = auth.user_id.clone();
    tokio::spawn(async move {
        let mut answer = String::new();
        let mut client_gone = false;
        let mut failed = false;

        while let Some(item) = upstream.next().await {
            match item {
                Ok(StreamEvent::Message { content }) => {
                    answer.push_str(&content);
                    if !client_gone {
                        let event = sse_event("message", json!({ "content": content }));
                        client_gone = tx.send(Ok(event)).await.is_err();
                    }
                }
                Ok(StreamEvent::Done { .. }) => break,
                Err(e) => {
                    tracing::error!(session_id = %session_id, "Chat stream failed: {:#}", e);
                    failed = true;
                    break;
                }
            }
        }

        if !answer.is_empty() {
            let saved = state
                .persist
                .append_message(&user_id, &session_id, ChatMessage::assistant(&answer))
                .await;
            if let Err(e) = saved {
                tracing::error!(session_id = %session_id, "Failed to save assistant message: {}", e);
            }
        } else if failed {
            refund_if_counted(&state, &user_id, UsageKind::Chat, outcome).await;
        }

        let last = if failed {
            sse_event("error", json!({ "error": "模型服务暂时不可用，请稍后重试" }))
        } else {
            sse_event("done", json!({ "content_length": answer.chars().count() }))
        };
        let _ = tx.send(Ok(last)).await;
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// Give back a quota unit taken for a request the model never answered
pub(crate) async fn refund_if_counted(
    state: &AppState,
    user_id: &str,
    kind: UsageKind,
    outcome: UsageOutcome,
) {
    if !outcome.was_counted() {
        return;
    }
    if let Err(e) = state.persist.refund_usage(user_id, kind, Utc::now()).await {
        tracing::error!(user_id = %user_id, "Failed to refund usage: {}", e);
    }
}
