//! Chat and search request/response types

use serde::{Deserialize, Serialize};

use crate::domain::document::DocType;
use crate::domain::retrieval::{RetrievalMode, RetrievalOverrides, SearchHit};

/// POST /search_with_intent request body.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub retrieval_mode: Option<RetrievalMode>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub graph_hops: Option<u8>,
    #[serde(default)]
    pub hybrid_alpha: Option<f32>,
    #[serde(default)]
    pub use_rerank: Option<bool>,
    #[serde(default)]
    pub doc_types: Option<Vec<DocType>>,
}

impl SearchRequest {
    pub fn overrides(&self) -> RetrievalOverrides {
        RetrievalOverrides {
            retrieval_mode: self.retrieval_mode,
            top_k: self.top_k,
            graph_hops: self.graph_hops,
            hybrid_alpha: self.hybrid_alpha,
            use_rerank: self.use_rerank,
            doc_types: self.doc_types.clone(),
        }
    }
}

/// One formatted search result entry.
#[derive(Debug, Serialize)]
pub struct SearchResultEntry {
    pub score: f32,
    pub text: String,
    pub doc_id: String,
    pub chunk_id: String,
    pub filename: String,
    pub doc_type: DocType,
    pub title: String,
    pub header: String,
    pub section_path: Vec<String>,
    pub page_nos: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_score: Option<f32>,
}

impl From<&SearchHit> for SearchResultEntry {
    fn from(hit: &SearchHit) -> Self {
        Self {
            score: hit.score,
            text: hit.chunk.text.clone(),
            doc_id: hit.chunk.doc_id.clone(),
            chunk_id: hit.chunk.chunk_id.clone(),
            filename: hit.chunk.filename.clone(),
            doc_type: hit.chunk.doc_type,
            title: hit.chunk.title.clone(),
            header: hit.chunk.header.clone(),
            section_path: hit.chunk.section_path.clone(),
            page_nos: hit.chunk.page_nos.clone(),
            vector_score: hit.vector_score,
            graph_score: hit.graph_score,
            original_score: hit.original_score,
        }
    }
}

/// POST /search_with_intent response body.
#[derive(Debug, Serialize)]
pub struct SearchWithIntentResponse {
    pub query: String,
    pub intent: String,
    pub intent_reason: String,
    pub suggested_top_k: usize,
    pub retrieval_mode: String,
    pub rerank_applied: bool,
    pub results: Vec<SearchResultEntry>,
}

/// POST /ask request body.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub retrieval_mode: Option<RetrievalMode>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub graph_hops: Option<u8>,
    #[serde(default)]
    pub hybrid_alpha: Option<f32>,
    #[serde(default)]
    pub use_rerank: Option<bool>,
}

impl AskRequest {
    pub fn overrides(&self) -> RetrievalOverrides {
        RetrievalOverrides {
            retrieval_mode: self.retrieval_mode,
            top_k: self.top_k,
            graph_hops: self.graph_hops,
            hybrid_alpha: self.hybrid_alpha,
            use_rerank: self.use_rerank,
            doc_types: None,
        }
    }
}

/// One message in an OpenAI-style request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// POST /v1/chat/completions request body.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub retrieval_mode: Option<RetrievalMode>,
    #[serde(default)]
    pub use_graph: Option<bool>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub graph_hops: Option<u8>,
    #[serde(default)]
    pub hybrid_alpha: Option<f32>,
    #[serde(default)]
    pub use_rerank: Option<bool>,
}

impl ChatCompletionRequest {
    /// The question is the last user message.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }

    pub fn overrides(&self) -> RetrievalOverrides {
        // `use_graph=false` forces pure vector; `true` without an
        // explicit mode upgrades to hybrid.
        let retrieval_mode = match (self.retrieval_mode, self.use_graph) {
            (Some(mode), _) => Some(mode),
            (None, Some(false)) => Some(RetrievalMode::Vector),
            (None, Some(true)) => Some(RetrievalMode::Hybrid),
            (None, None) => None,
        };
        RetrievalOverrides {
            retrieval_mode,
            top_k: self.top_k,
            graph_hops: self.graph_hops,
            hybrid_alpha: self.hybrid_alpha,
            use_rerank: self.use_rerank,
            doc_types: None,
        }
    }
}
