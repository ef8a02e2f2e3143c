use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use kaogong_llm::{ChatOptions, ChatRequest, JsonArrayDecoder, Message as LLMMessage, StreamEvent};
use kaogong_persist::UsageOutcome;
use kaogong_types::{QuizQuestion, QuizRequest, UsageKind};

use crate::{
    error::{ApiError, ApiResult},
    handlers::{chat_stream::refund_if_counted, sse_event},
    middleware::auth::AuthUser,
    services::prompts::quiz_instruction,
    state::AppState,
};

const QUIZ_SYSTEM_PROMPT: &str = "你是公务员考试命题专家，只输出符合要求的 JSON。";

/// Generate practice questions and stream each one as soon as it is complete
///
/// Events: `question {index, question}` per well-formed question, then
/// `done {count}`; `error {error}` when no usable question was produced.
#[utoipa::path(
    post,
    path = "/quiz",
    responses(
        (status = 200, description = "Streaming questions", content_type = "text/event-stream"),
        (status = 400, description = "Invalid quiz request"),
        (status = 429, description = "Daily quiz quota used up"),
        (status = 502, description = "Model service unavailable")
    ),
    tag = "quiz"
)]
pub async fn generate_quiz_stream(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<QuizRequest>,
) -> ApiResult<Sse<ReceiverStream<Result<Event, Infallible>>>> {
    req.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let limits = state.config.usage_limits();
    let outcome = state
        .persist
        .check_and_deduct_usage(&auth.user_id, UsageKind::Quiz, &limits, Utc::now())
        .await?;
    if let UsageOutcome::Exhausted { limit } = outcome {
        return Err(ApiError::UsageExhausted { kind: "quiz", limit });
    }

    let llm = &state.config.llm;
    let messages = vec![
        LLMMessage::system(QUIZ_SYSTEM_PROMPT),
        LLMMessage::human(quiz_instruction(&req)),
    ];
    let request = ChatRequest::new(&llm.model, messages).with_options(
        ChatOptions::new()
            .temperature(llm.temperature)
            .max_tokens(llm.max_output_tokens)
            .json_output(true),
    );

    let mut upstream = match state.llm_client.chat_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            refund_if_counted(&state, &auth.user_id, UsageKind::Quiz, outcome).await;
            return Err(ApiError::Upstream(e));
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    let user_id = auth.user_id.clone();
    tokio::spawn(async move {
        let wanted = req.count as usize;
        let mut decoder = JsonArrayDecoder::new();
        let mut emitted = 0usize;
        let mut failed = false;

        'relay: while let Some(item) = upstream.next().await {
            let delta = match item {
                Ok(StreamEvent::Message { content }) => content,
                Ok(StreamEvent::Done { .. }) => break,
                Err(e) => {
                    tracing::error!(user_id = %user_id, "Quiz stream failed: {:#}", e);
                    failed = true;
                    break;
                }
            };

            for value in decoder.push(&delta) {
                let question = match serde_json::from_value::<QuizQuestion>(value) {
                    Ok(q) if q.is_well_formed(req.question_type) => q,
                    Ok(q) => {
                        tracing::warn!(question = %q.question, "Skipping malformed quiz question");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping undecodable quiz question: {}", e);
                        continue;
                    }
                };
                let event = sse_event("question", json!({ "index": emitted, "question": question }));
                if tx.send(Ok(event)).await.is_err() {
                    // Client went away; questions already sent count as delivered
                    break 'relay;
                }
                emitted += 1;
                if emitted == wanted {
                    break 'relay;
                }
            }

            if decoder.is_closed() {
                break;
            }
        }

        if decoder.skipped() > 0 {
            tracing::warn!(skipped = decoder.skipped(), "Quiz output contained unparsable elements");
        }

        let last = if emitted == 0 {
            refund_if_counted(&state, &user_id, UsageKind::Quiz, outcome).await;
            let message = if failed {
                "模型服务暂时不可用，请稍后重试"
            } else {
                "未能生成有效题目，请调整主题后重试"
            };
            sse_event("error", json!({ "error": message }))
        } else {
            sse_event("done", json!({ "count": emitted }))
        };
        let _ = tx.send(Ok(last)).await;
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}
