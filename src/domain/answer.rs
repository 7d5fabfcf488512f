//! Ask pipeline event vocabulary, citations, and cancellation.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::document::DocType;
use crate::domain::ingestion::ChunkRecord;
use crate::domain::llm::LlmUsage;
use crate::domain::retrieval::SearchHit;

/// Pipeline stage reported through progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Intent,
    Retrieval,
    Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Running,
    Done,
}

/// One source handed to the generator, labelled `S1..Sn`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceContext {
    pub source_id: String,
    pub text: String,
    pub title: String,
    pub filename: String,
    pub doc_type: DocType,
    pub doc_id: String,
    pub chunk_id: String,
    pub header: String,
    pub section_path: Vec<String>,
    pub page_nos: Vec<u32>,
    pub score: f32,
}

/// Resolved citation emitted after generation completes.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub source_id: String,
    pub doc_id: String,
    pub chunk_id: String,
    pub filename: String,
    pub title: String,
    pub doc_type: DocType,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_score: Option<f32>,
    pub text_preview: String,
    pub page_nos: Vec<u32>,
    pub header: String,
    pub section_path: Vec<String>,
}

/// Build the numbered source pack for a ranked hit list.
pub fn build_source_contexts(hits: &[SearchHit]) -> Vec<SourceContext> {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let chunk = &hit.chunk;
            SourceContext {
                source_id: format!("S{}", i + 1),
                text: chunk.text.clone(),
                title: chunk.title.clone(),
                filename: chunk.filename.clone(),
                doc_type: chunk.doc_type,
                doc_id: chunk.doc_id.clone(),
                chunk_id: chunk.chunk_id.clone(),
                header: chunk.header.clone(),
                section_path: chunk.section_path.clone(),
                page_nos: chunk.page_nos.clone(),
                score: hit.score,
            }
        })
        .collect()
}

/// Build the citation entry for one ranked hit.
pub fn build_citation(source_id: &str, hit: &SearchHit) -> Citation {
    let chunk: &ChunkRecord = &hit.chunk;
    Citation {
        source_id: source_id.to_string(),
        doc_id: chunk.doc_id.clone(),
        chunk_id: chunk.chunk_id.clone(),
        filename: chunk.filename.clone(),
        title: chunk.title.clone(),
        doc_type: chunk.doc_type,
        score: hit.score,
        vector_score: hit.vector_score,
        graph_score: hit.graph_score,
        original_score: hit.original_score,
        text_preview: chunk.text_preview(220),
        page_nos: chunk.page_nos.clone(),
        header: chunk.header.clone(),
        section_path: chunk.section_path.clone(),
    }
}

/// Typed event sequence produced by the ask pipeline. The transport
/// adapts it to SSE.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AskEvent {
    Progress {
        stage: ProgressStage,
        status: ProgressStatus,
        message: String,
        #[serde(skip_serializing_if = "serde_json::Value::is_null")]
        extra: serde_json::Value,
    },
    Session {
        session_id: String,
    },
    Delta {
        content: String,
    },
    Citations {
        citations: Vec<Citation>,
    },
    Error {
        message: String,
        kind: String,
        retryable: bool,
    },
    Done {
        model: String,
        usage: LlmUsage,
    },
}

impl AskEvent {
    pub fn progress(stage: ProgressStage, status: ProgressStatus, message: impl Into<String>) -> Self {
        Self::Progress {
            stage,
            status,
            message: message.into(),
            extra: serde_json::Value::Null,
        }
    }

    pub fn progress_with(
        stage: ProgressStage,
        status: ProgressStatus,
        message: impl Into<String>,
        extra: serde_json::Value,
    ) -> Self {
        Self::Progress {
            stage,
            status,
            message: message.into(),
            extra,
        }
    }
}

/// Per-request cancellation handle, observed at stage boundaries and in
/// the token-forwarding loop.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
