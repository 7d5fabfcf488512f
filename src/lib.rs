//! Audit RAG Gateway
//!
//! A retrieval-augmented question-answering server for audit and
//! compliance documents:
//! - Structure-aware chunking of regulations, audit reports, and issue
//!   ledgers
//! - Content-addressed document registry with dedup, versioning, and
//!   logical delete
//! - Dual-index write path: file-backed vector store + knowledge graph
//! - Hybrid retrieval (vector recall + bounded-hop graph expansion),
//!   cross-encoder rerank, intent routing
//! - Streamed, citation-bearing answers with multi-turn sessions

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use api::state::{AppState, ProviderInfo};
use domain::embedding::EmbeddingProvider;
use domain::llm::LlmProvider;
use domain::rerank::RerankProvider;
use domain::retrieval::RetrievalOptions;
use domain::session::SessionLimits;
use domain::DomainError;
use infrastructure::embedding::{OpenAiCompatibleEmbedding, OpenAiEmbeddingSettings};
use infrastructure::llm::{OpenAiCompatibleLlm, OpenAiLlmSettings};
use infrastructure::rerank::{DashScopeRerank, DashScopeRerankSettings};
use infrastructure::services::{AskService, IngestionService, StoreSet};
use infrastructure::session::SessionStore;

/// Create the application state with providers built from config.
pub fn create_app_state(config: &AppConfig) -> Result<AppState, DomainError> {
    let embedder = create_embedding_provider(config)?;
    let reranker = create_rerank_provider(config)?;
    let llm = create_llm_provider(config)?;
    create_app_state_with_providers(config, embedder, reranker, llm)
}

/// Create the application state with injected providers. Loads the
/// persisted stores and runs the startup consistency check.
pub fn create_app_state_with_providers(
    config: &AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankProvider>>,
    llm: Option<Arc<dyn LlmProvider>>,
) -> Result<AppState, DomainError> {
    let stores = Arc::new(StoreSet::open(
        &config.storage.data_root,
        embedder.dimension(),
    )?);

    let sessions = Arc::new(SessionStore::new(SessionLimits {
        max_messages: config.session.max_messages.max(6),
        ttl_seconds: config.session.ttl_minutes.max(5) * 60,
    }));

    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&stores),
        Arc::clone(&embedder),
        config.ingestion.chunk_size,
        config.ingestion.overlap,
        config.ingestion.concurrency,
        Duration::from_secs(config.ingestion.embed_budget_secs),
    ));

    let defaults = RetrievalOptions {
        top_k: config.retrieval.top_k,
        rerank_top_k: config.retrieval.rerank_top_k,
        alpha: config.retrieval.hybrid_alpha,
        graph_top_k: config.retrieval.graph_top_k,
        hops: config.retrieval.graph_hops,
        use_rerank: reranker.is_some(),
        ..Default::default()
    };

    let providers = ProviderInfo {
        embedding_provider: embedder.provider_name().to_string(),
        embedding_dimension: embedder.dimension(),
        llm_model: llm.as_ref().map(|l| l.model_name().to_string()),
        rerank_enabled: reranker.is_some(),
    };

    let ask = Arc::new(AskService::new(
        Arc::clone(&stores),
        embedder,
        reranker,
        llm,
        sessions,
        defaults,
        Duration::from_secs(config.retrieval.provider_budget_secs),
    ));

    info!(
        data_root = %config.storage.data_root.display(),
        dimension = providers.embedding_dimension,
        rerank = providers.rerank_enabled,
        llm = providers.llm_model.as_deref().unwrap_or("disabled"),
        "application state initialised"
    );

    Ok(AppState::new(ingestion, ask, stores, providers))
}

fn read_api_key(env_name: &str) -> String {
    std::env::var(env_name).unwrap_or_default()
}

fn create_embedding_provider(
    config: &AppConfig,
) -> Result<Arc<dyn EmbeddingProvider>, DomainError> {
    let settings = OpenAiEmbeddingSettings {
        model: config.embedding.model.clone(),
        api_key: read_api_key(&config.embedding.api_key_env),
        endpoint: config.embedding.endpoint.clone(),
        dimension: config.embedding.dimension,
        batch_size: config.embedding.batch_size,
        timeout_secs: config.embedding.timeout_secs,
        max_retries: config.embedding.max_retries,
    };
    Ok(Arc::new(OpenAiCompatibleEmbedding::new(settings)?))
}

fn create_rerank_provider(
    config: &AppConfig,
) -> Result<Option<Arc<dyn RerankProvider>>, DomainError> {
    if !config.rerank.enabled {
        return Ok(None);
    }
    let settings = DashScopeRerankSettings {
        model: config.rerank.model.clone(),
        api_key: read_api_key(&config.rerank.api_key_env),
        endpoint: config.rerank.endpoint.clone(),
        timeout_secs: config.rerank.timeout_secs,
    };
    Ok(Some(Arc::new(DashScopeRerank::new(settings)?)))
}

fn create_llm_provider(config: &AppConfig) -> Result<Option<Arc<dyn LlmProvider>>, DomainError> {
    if !config.llm.enabled {
        return Ok(None);
    }
    let settings = OpenAiLlmSettings {
        model: config.llm.model.clone(),
        api_key: read_api_key(&config.llm.api_key_env),
        endpoint: config.llm.endpoint.clone(),
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
        timeout_secs: config.llm.timeout_secs,
    };
    Ok(Some(Arc::new(OpenAiCompatibleLlm::new(settings)?)))
}
