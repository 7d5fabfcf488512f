use std::path::PathBuf;

use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub ingestion: IngestionConfig,
    pub retrieval: RetrievalConfig,
    pub session: SessionConfig,
    pub embedding: EmbeddingProviderConfig,
    pub rerank: RerankProviderConfig,
    pub llm: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for registry.json, vector.index/.docs, and graph.bin.
    pub data_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Cap on concurrently processed files within one request.
    pub concurrency: usize,
    /// Total per-file embedding budget, retries included (seconds).
    pub embed_budget_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub rerank_top_k: usize,
    pub hybrid_alpha: f32,
    pub graph_top_k: usize,
    pub graph_hops: u8,
    /// Total per-provider-call budget for query-time calls (seconds).
    pub provider_budget_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_messages: usize,
    pub ttl_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingProviderConfig {
    pub model: String,
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RerankProviderConfig {
    pub enabled: bool,
    pub model: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    pub enabled: bool,
    pub model: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./data"),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
            concurrency: 1,
            embed_budget_secs: 300,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            rerank_top_k: 10,
            hybrid_alpha: crate::domain::retrieval::DEFAULT_HYBRID_ALPHA,
            graph_top_k: 12,
            graph_hops: 2,
            provider_budget_secs: 120,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: 24,
            ttl_minutes: 120,
        }
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-v3".to_string(),
            endpoint: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            dimension: 1024,
            batch_size: 32,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl Default for RerankProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gte-rerank".to_string(),
            endpoint:
                "https://dashscope.aliyuncs.com/api/v1/services/rerank/text-rerank/text-rerank"
                    .to_string(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "deepseek-chat".to_string(),
            endpoint: "https://api.deepseek.com/v1".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// Layered load: `config/default` file, `config/local` override,
    /// `APP__`-prefixed environment variables on top.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ingestion.chunk_size, 512);
        assert_eq!(config.ingestion.concurrency, 1);
        assert!((config.retrieval.hybrid_alpha - 0.65).abs() < 1e-6);
        assert_eq!(config.session.max_messages, 24);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "server": {"port": 9000},
            "retrieval": {"graph_hops": 3}
        }))
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.retrieval.graph_hops, 3);
        assert_eq!(config.retrieval.top_k, 5);
    }
}
