//! OpenAI-compatible chat provider (DeepSeek, DashScope, vLLM, ...)

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::domain::llm::{
    LlmProvider, LlmRequest, LlmResponse, LlmStream, LlmUsage, StreamChunk,
};
use crate::domain::DomainError;

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiLlmSettings {
    pub model: String,
    pub api_key: String,
    /// Base URL, e.g. `https://api.deepseek.com/v1`.
    pub endpoint: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-attempt budget.
    pub timeout_secs: u64,
}

/// Chat provider speaking the OpenAI chat-completions wire format.
#[derive(Debug)]
pub struct OpenAiCompatibleLlm {
    settings: OpenAiLlmSettings,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
    delta: Option<ChatDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAiCompatibleLlm {
    pub fn new(settings: OpenAiLlmSettings) -> Result<Self, DomainError> {
        if settings.api_key.is_empty() {
            return Err(DomainError::llm("LLM api key not configured"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| DomainError::llm(format!("build http client: {e}")))?;
        Ok(Self { settings, client })
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.endpoint.trim_end_matches('/')
        )
    }

    fn build_body(&self, request: &LlmRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.settings.model,
            "messages": request
                .messages
                .iter()
                .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
                .collect::<Vec<_>>(),
            "temperature": request.temperature.unwrap_or(self.settings.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.settings.max_tokens),
            "stream": stream,
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, DomainError> {
        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.settings.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DomainError::provider_timeout(format!("LLM request: {e}"))
                } else {
                    DomainError::llm(format!("LLM request: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DomainError::llm(format!("LLM API error {status}: {text}")));
        }
        Ok(response)
    }

    /// Parse one `data:` SSE payload into a stream chunk.
    fn parse_sse_data(data: &str) -> Option<Result<StreamChunk, DomainError>> {
        if data == "[DONE]" {
            return None;
        }
        match serde_json::from_str::<ChatResponse>(data) {
            Ok(parsed) => {
                let choice = parsed.choices.into_iter().next()?;
                if let Some(content) = choice.delta.and_then(|d| d.content) {
                    if !content.is_empty() {
                        return Some(Ok(StreamChunk::delta(content)));
                    }
                }
                choice
                    .finish_reason
                    .map(|reason| Ok(StreamChunk::finish(reason)))
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed SSE payload");
                None
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleLlm {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        let body = self.build_body(&request, false);
        debug!(model = %self.settings.model, "LLM chat request");
        let response = self.post(&body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DomainError::llm(format!("decode LLM response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::llm("no choices in LLM response"))?;
        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: parsed.model.unwrap_or_else(|| self.settings.model.clone()),
            usage: parsed
                .usage
                .map(|u| LlmUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                })
                .unwrap_or_default(),
        })
    }

    async fn chat_stream(&self, request: LlmRequest) -> Result<LlmStream, DomainError> {
        let body = self.build_body(&request, true);
        debug!(model = %self.settings.model, "LLM streaming chat request");
        let response = self.post(&body).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<StreamChunk, DomainError>>(32);
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        // SSE events are separated by a blank line.
                        while let Some(pos) = buffer.find("\n\n") {
                            let event: String = buffer.drain(..pos + 2).collect();
                            for line in event.lines() {
                                let Some(data) = line.strip_prefix("data:") else {
                                    continue;
                                };
                                match Self::parse_sse_data(data.trim()) {
                                    Some(item) => {
                                        if tx.send(item).await.is_err() {
                                            return;
                                        }
                                    }
                                    None if data.trim() == "[DONE]" => return,
                                    None => {}
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(DomainError::llm(format!("LLM stream: {e}"))))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_delta() {
        let data = r#"{"choices":[{"delta":{"content":"制度"},"index":0}]}"#;
        let chunk = OpenAiCompatibleLlm::parse_sse_data(data).unwrap().unwrap();
        assert_eq!(chunk.delta.as_deref(), Some("制度"));
    }

    #[test]
    fn test_parse_sse_finish() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let chunk = OpenAiCompatibleLlm::parse_sse_data(data).unwrap().unwrap();
        assert!(chunk.delta.is_none());
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_sse_done_and_garbage() {
        assert!(OpenAiCompatibleLlm::parse_sse_data("[DONE]").is_none());
        assert!(OpenAiCompatibleLlm::parse_sse_data("not json").is_none());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let settings = OpenAiLlmSettings {
            model: "deepseek-chat".to_string(),
            api_key: String::new(),
            endpoint: "https://api.deepseek.com/v1".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 60,
        };
        assert!(OpenAiCompatibleLlm::new(settings).is_err());
    }
}
