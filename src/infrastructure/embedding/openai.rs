//! OpenAI-compatible embedding provider with retry and backoff
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;

/// Connection settings for an OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingSettings {
    pub model: String,
    pub api_key: String,
    /// Base URL, e.g. `https://dashscope.aliyuncs.com/compatible-mode/v1`.
    pub endpoint: String,
    pub dimension: usize,
    pub batch_size: usize,
    /// Per-attempt budget.
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Embedding provider speaking the OpenAI embeddings wire format.
#[derive(Debug)]
pub struct OpenAiCompatibleEmbedding {
    settings: OpenAiEmbeddingSettings,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiCompatibleEmbedding {
    pub fn new(settings: OpenAiEmbeddingSettings) -> Result<Self, DomainError> {
        if settings.api_key.is_empty() {
            return Err(DomainError::embedding("embedding api key not configured", false));
        }
        if settings.dimension == 0 {
            return Err(DomainError::embedding("embedding dimension must be set", false));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| DomainError::embedding(format!("build http client: {e}"), false))?;
        Ok(Self { settings, client })
    }

    fn embeddings_url(&self) -> String {
        format!(
            "{}/embeddings",
            self.settings.endpoint.trim_end_matches('/')
        )
    }

    async fn attempt(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "input": texts,
        });

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DomainError::provider_timeout(format!("embedding request: {e}"))
                } else {
                    DomainError::embedding(format!("embedding request: {e}"), true)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.as_u16() == 429 || status.is_server_error();
            let text = response.text().await.unwrap_or_default();
            return Err(DomainError::embedding(
                format!("embedding API error {status}: {text}"),
                retryable,
            ));
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| DomainError::embedding(format!("decode response: {e}"), false))?;
        parsed.data.sort_by_key(|item| item.index);

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|item| item.embedding).collect();
        if vectors.len() != texts.len() {
            return Err(DomainError::embedding(
                format!("expected {} vectors, got {}", texts.len(), vectors.len()),
                false,
            ));
        }
        for vector in &vectors {
            if vector.len() != self.settings.dimension {
                return Err(DomainError::embedding(
                    format!(
                        "declared dimension {} but provider returned {}",
                        self.settings.dimension,
                        vector.len()
                    ),
                    false,
                ));
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.settings.batch_size {
            return Err(DomainError::embedding(
                format!(
                    "batch of {} exceeds provider cap {}",
                    texts.len(),
                    self.settings.batch_size
                ),
                false,
            ));
        }

        let mut last_error = None;
        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, ?delay, "retrying embedding batch");
                tokio::time::sleep(delay).await;
            }

            match self.attempt(texts).await {
                Ok(vectors) => {
                    debug!(batch = texts.len(), "embedding batch complete");
                    return Ok(vectors);
                }
                Err(e) if e.retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| DomainError::embedding("embedding failed after retries", true)))
    }

    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    fn provider_name(&self) -> &'static str {
        "openai_compatible"
    }
}
