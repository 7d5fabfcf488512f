//! Query endpoints: intent search, ask, OpenAI-compatible chat

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{
    ApiError, AskRequest, ChatCompletionRequest, SearchRequest, SearchResultEntry,
    SearchWithIntentResponse,
};
use crate::domain::answer::AskEvent;

/// POST /search_with_intent
pub async fn search_with_intent(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Response, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }

    let result = state
        .ask
        .search_with_intent(&request.query, &request.overrides())
        .await?;

    let response = SearchWithIntentResponse {
        query: request.query,
        intent: result.route.intent.as_str().to_string(),
        intent_reason: result.route.reason.clone(),
        suggested_top_k: result.route.options.top_k,
        retrieval_mode: result.route.options.mode.as_str().to_string(),
        rerank_applied: result.outcome.rerank_applied,
        results: result.outcome.hits.iter().map(SearchResultEntry::from).collect(),
    };
    Ok(Json(response).into_response())
}

/// POST /ask — non-streaming answer
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Response, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }

    let answer = state
        .ask
        .answer(&request.query, &request.overrides(), request.session_id.as_deref())
        .await?;

    Ok(Json(json!({
        "query": request.query,
        "intent": answer.route.intent.as_str(),
        "intent_reason": answer.route.reason,
        "answer": answer.answer,
        "citations": answer.citations,
        "search_results": answer.hits.iter().map(SearchResultEntry::from).collect::<Vec<_>>(),
        "model": answer.model,
        "usage": answer.usage,
    }))
    .into_response())
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    let Some(query) = request.last_user_message().map(str::to_string) else {
        return Err(ApiError::bad_request("no user message found"));
    };

    info!(
        stream = request.stream,
        session = request.session_id.as_deref().unwrap_or("-"),
        "chat completion request"
    );

    if request.stream {
        let (_cancel, events) =
            state
                .ask
                .clone()
                .ask_stream(query, request.overrides(), request.session_id.clone());
        let stream = sse_adapter(events);
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response());
    }

    let answer = state
        .ask
        .answer(&query, &request.overrides(), request.session_id.as_deref())
        .await?;

    Ok(Json(json!({
        "choices": [{
            "message": {"role": "assistant", "content": answer.answer},
            "finish_reason": "stop",
            "index": 0,
        }],
        "model": answer.model,
        "usage": answer.usage,
        "intent": answer.route.intent.as_str(),
        "citations": answer.citations,
    }))
    .into_response())
}

/// Adapt the typed ask event sequence to SSE frames. Content deltas use
/// the OpenAI chunk shape; everything else is a tagged JSON event. The
/// stream always terminates with `[DONE]`.
fn sse_adapter(
    events: impl Stream<Item = AskEvent> + Send + 'static,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> + Send {
    let mapped = events.map(|event| {
        let payload = match event {
            AskEvent::Delta { content } => json!({
                "choices": [{
                    "delta": {"content": content},
                    "index": 0,
                    "finish_reason": null,
                }]
            }),
            AskEvent::Done { model, usage } => json!({
                "choices": [{
                    "delta": {},
                    "index": 0,
                    "finish_reason": "stop",
                }],
                "model": model,
                "usage": usage,
            }),
            other => serde_json::to_value(&other).unwrap_or_else(|_| json!({"event": "error"})),
        };
        Ok(Event::default().data(payload.to_string()))
    });

    mapped.chain(futures::stream::once(async {
        Ok(Event::default().data("[DONE]"))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::answer::{ProgressStage, ProgressStatus};
    use crate::domain::llm::LlmUsage;

    #[tokio::test]
    async fn test_sse_adapter_shapes() {
        let events = futures::stream::iter(vec![
            AskEvent::progress(ProgressStage::Intent, ProgressStatus::Running, "意图识别中"),
            AskEvent::Delta {
                content: "回答".to_string(),
            },
            AskEvent::Done {
                model: "m".to_string(),
                usage: LlmUsage::default(),
            },
        ]);

        let frames: Vec<String> = sse_adapter(events)
            .map(|e| format!("{:?}", e.unwrap()))
            .collect()
            .await;

        assert_eq!(frames.len(), 4);
        assert!(frames[0].contains("progress"));
        assert!(frames[1].contains("delta"));
        assert!(frames[2].contains("finish_reason"));
        assert!(frames[3].contains("[DONE]"));
    }
}
