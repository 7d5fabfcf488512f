//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, EmbeddingProviderConfig, IngestionConfig, LlmProviderConfig, LogFormat,
    LoggingConfig, RerankProviderConfig, RetrievalConfig, ServerConfig, SessionConfig,
    StorageConfig,
};
