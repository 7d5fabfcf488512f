//! Shared fixtures: mock providers and a ready-to-use app state.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tempfile::TempDir;

use audit_rag_gateway::api::AppState;
use audit_rag_gateway::config::AppConfig;
use audit_rag_gateway::create_app_state_with_providers;
use audit_rag_gateway::domain::embedding::EmbeddingProvider;
use audit_rag_gateway::domain::llm::{
    LlmProvider, LlmRequest, LlmResponse, LlmStream, LlmUsage, StreamChunk,
};
use audit_rag_gateway::domain::rerank::{RankedItem, RerankProvider};
use audit_rag_gateway::domain::DomainError;
use audit_rag_gateway::infrastructure::services::IngestFile;

/// Character-unigram embedding: each codepoint maps to its own bucket,
/// so shared characters mean non-zero cosine and disjoint texts score
/// exactly zero. Deterministic across runs.
#[derive(Debug)]
pub struct CharEmbedding {
    dimension: usize,
    calls: AtomicUsize,
}

impl CharEmbedding {
    pub fn new() -> Self {
        Self {
            // Covers the BMP so distinct characters never collide.
            dimension: 65536,
            calls: AtomicUsize::new(0),
        }
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CharEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimension];
                for c in text.chars() {
                    let bucket = (c as usize) % self.dimension;
                    vector[bucket] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &'static str {
        "char-unigram"
    }
}

/// Scripted LLM: returns a fixed answer for every chat and counts every
/// invocation (chat and chat_stream alike).
#[derive(Debug)]
pub struct ScriptedLlm {
    answer: String,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl ScriptedLlm {
    pub fn new(answer: impl Into<String>) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                answer: answer.into(),
                calls: Arc::clone(&calls),
                fail: false,
            }),
            calls,
        )
    }

    pub fn failing() -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                answer: String::new(),
                calls: Arc::clone(&calls),
                fail: true,
            }),
            calls,
        )
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, _request: LlmRequest) -> Result<LlmResponse, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DomainError::llm("scripted failure"));
        }
        Ok(LlmResponse {
            content: self.answer.clone(),
            model: "scripted".to_string(),
            usage: LlmUsage::default(),
        })
    }

    async fn chat_stream(&self, _request: LlmRequest) -> Result<LlmStream, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DomainError::llm("scripted failure"));
        }
        // Stream in 3-char pieces so citation tokens split across
        // delta boundaries.
        let chars: Vec<char> = self.answer.chars().collect();
        let chunks: Vec<Result<StreamChunk, DomainError>> = chars
            .chunks(3)
            .map(|piece| Ok(StreamChunk::delta(piece.iter().collect::<String>())))
            .chain(std::iter::once(Ok(StreamChunk::finish("stop"))))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Reranker that always fails, to exercise the fused-order fallback.
#[derive(Debug)]
pub struct BrokenRerank;

#[async_trait]
impl RerankProvider for BrokenRerank {
    async fn rerank(
        &self,
        _query: &str,
        _documents: &[String],
        _top_k: usize,
    ) -> Result<Vec<RankedItem>, DomainError> {
        Err(DomainError::rerank("always down"))
    }

    fn provider_name(&self) -> &'static str {
        "broken"
    }
}

/// App state over a temp data root with injected providers.
pub struct TestEnv {
    pub state: AppState,
    pub data_root: std::path::PathBuf,
    _tmp: TempDir,
}

pub fn build_env(
    llm: Option<Arc<dyn LlmProvider>>,
    reranker: Option<Arc<dyn RerankProvider>>,
) -> TestEnv {
    let tmp = TempDir::new().expect("tempdir");
    let mut config = AppConfig::default();
    config.storage.data_root = tmp.path().to_path_buf();

    let state = create_app_state_with_providers(&config, Arc::new(CharEmbedding::new()), reranker, llm)
        .expect("app state");
    TestEnv {
        state,
        data_root: tmp.path().to_path_buf(),
        _tmp: tmp,
    }
}

/// Reopen the same data root, as a process restart would.
pub fn reopen_env(env: &TestEnv, llm: Option<Arc<dyn LlmProvider>>) -> AppState {
    let mut config = AppConfig::default();
    config.storage.data_root = env.data_root.clone();
    create_app_state_with_providers(&config, Arc::new(CharEmbedding::new()), None, llm)
        .expect("reopened app state")
}

pub fn txt_file(name: &str, content: &str) -> IngestFile {
    IngestFile {
        filename: name.to_string(),
        bytes: content.as_bytes().to_vec(),
    }
}
