//! DashScope gte-rerank cross-encoder provider

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::rerank::{RankedItem, RerankProvider};
use crate::domain::DomainError;

/// Vendor limit on documents per request.
const MAX_DOCS: usize = 10;
/// Vendor limit on characters per document.
const MAX_DOC_CHARS: usize = 1000;

/// Connection settings for the DashScope rerank service.
#[derive(Debug, Clone)]
pub struct DashScopeRerankSettings {
    pub model: String,
    pub api_key: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

/// Cross-encoder rerank over the DashScope text-rerank API.
#[derive(Debug)]
pub struct DashScopeRerank {
    settings: DashScopeRerankSettings,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RerankResponse {
    output: RerankOutput,
}

#[derive(Deserialize)]
struct RerankOutput {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl DashScopeRerank {
    pub fn new(settings: DashScopeRerankSettings) -> Result<Self, DomainError> {
        if settings.api_key.is_empty() {
            return Err(DomainError::rerank("rerank api key not configured"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| DomainError::rerank(format!("build http client: {e}")))?;
        Ok(Self { settings, client })
    }

    /// Enforce vendor caps by truncating the candidate list and each
    /// document's text.
    fn prepare_documents(documents: &[String]) -> Vec<String> {
        if documents.len() > MAX_DOCS {
            warn!(
                submitted = documents.len(),
                cap = MAX_DOCS,
                "truncating rerank candidates to vendor cap"
            );
        }
        documents
            .iter()
            .take(MAX_DOCS)
            .map(|doc| {
                if doc.chars().count() > MAX_DOC_CHARS {
                    let truncated: String = doc.chars().take(MAX_DOC_CHARS).collect();
                    format!("{truncated}...")
                } else {
                    doc.clone()
                }
            })
            .collect()
    }
}

#[async_trait]
impl RerankProvider for DashScopeRerank {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RankedItem>, DomainError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = Self::prepare_documents(documents);
        let top_n = top_k.min(prepared.len());
        let body = serde_json::json!({
            "model": self.settings.model,
            "input": {
                "query": query,
                "documents": prepared,
            },
            "parameters": {
                "top_n": top_n,
                "return_documents": false,
            },
        });

        debug!(candidates = prepared.len(), top_n, "rerank request");
        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DomainError::provider_timeout(format!("rerank request: {e}"))
                } else {
                    DomainError::rerank(format!("rerank request: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DomainError::rerank(format!(
                "rerank API error {status}: {text}"
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| DomainError::rerank(format!("decode response: {e}")))?;

        let mut items: Vec<RankedItem> = parsed
            .output
            .results
            .into_iter()
            .filter(|r| r.index < documents.len())
            .map(|r| RankedItem {
                index: r.index,
                relevance_score: r.relevance_score,
            })
            .collect();
        items.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        items.truncate(top_k);
        Ok(items)
    }

    fn provider_name(&self) -> &'static str {
        "dashscope"
    }
}
