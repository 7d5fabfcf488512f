//! Application state for shared services

use std::sync::Arc;

use serde::Serialize;

use crate::infrastructure::services::{AskService, IngestionService, StoreSet};

/// Static provider facts surfaced by `GET /info`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub embedding_provider: String,
    pub embedding_dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    pub rerank_enabled: bool,
}

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub ask: Arc<AskService>,
    pub stores: Arc<StoreSet>,
    pub providers: ProviderInfo,
}

impl AppState {
    pub fn new(
        ingestion: Arc<IngestionService>,
        ask: Arc<AskService>,
        stores: Arc<StoreSet>,
        providers: ProviderInfo,
    ) -> Self {
        Self {
            ingestion,
            ask,
            stores,
            providers,
        }
    }
}
