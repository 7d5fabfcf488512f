use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Chunk error: {message}")]
    Chunk { message: String },

    #[error("Embedding error: {message}")]
    Embedding { message: String, retryable: bool },

    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    #[error("Graph store error: {message}")]
    GraphStore { message: String },

    #[error("Registry error: {message}")]
    Registry { message: String },

    #[error("Rerank error: {message}")]
    Rerank { message: String },

    #[error("Provider timeout: {message}")]
    ProviderTimeout { message: String },

    #[error("LLM error: {message}")]
    Llm { message: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl DomainError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn chunk(message: impl Into<String>) -> Self {
        Self::Chunk {
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>, retryable: bool) -> Self {
        Self::Embedding {
            message: message.into(),
            retryable,
        }
    }

    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            message: message.into(),
        }
    }

    pub fn graph_store(message: impl Into<String>) -> Self {
        Self::GraphStore {
            message: message.into(),
        }
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    pub fn rerank(message: impl Into<String>) -> Self {
        Self::Rerank {
            message: message.into(),
        }
    }

    pub fn provider_timeout(message: impl Into<String>) -> Self {
        Self::ProviderTimeout {
            message: message.into(),
        }
    }

    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Stable kind tag used in API error envelopes and SSE error events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::Chunk { .. } => "chunk_error",
            Self::Embedding { .. } => "embedding_error",
            Self::VectorStore { .. } => "vector_store_error",
            Self::GraphStore { .. } => "graph_store_error",
            Self::Registry { .. } => "registry_error",
            Self::Rerank { .. } => "rerank_error",
            Self::ProviderTimeout { .. } => "provider_timeout",
            Self::Llm { .. } => "llm_error",
            Self::Cancelled => "cancelled",
            Self::BadRequest { .. } => "bad_request",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Embedding {
                retryable: true,
                ..
            } | Self::ProviderTimeout { .. }
        )
    }
}
