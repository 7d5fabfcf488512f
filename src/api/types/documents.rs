//! Document management request/response types

use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentRecord;
use crate::domain::ingestion::ChunkRecord;
use crate::infrastructure::services::{FileOutcome, IngestReport};

/// POST /upload_store response body.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub processed: usize,
    pub skipped: usize,
    pub updated: usize,
    pub failed: usize,
    pub total_chunks: usize,
    pub chunker_used: String,
    pub results: Vec<FileOutcome>,
}

impl From<IngestReport> for UploadResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            processed: report.processed,
            skipped: report.skipped,
            updated: report.updated,
            failed: report.failed,
            total_chunks: report.total_chunks,
            chunker_used: report.chunker_used,
            results: report.results,
        }
    }
}

/// GET /documents query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentListQuery {
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// GET /documents/{id}/chunks query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ChunkListQuery {
    #[serde(default = "default_include_text")]
    pub include_text: bool,
}

fn default_include_text() -> bool {
    true
}

/// Chunk entry, optionally without its text body.
#[derive(Debug, Serialize)]
pub struct ChunkEntry {
    pub chunk_id: String,
    pub ordinal: usize,
    pub char_count: usize,
    pub header: String,
    pub section_path: Vec<String>,
    pub boundary: String,
    pub page_nos: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ChunkEntry {
    pub fn from_chunk(chunk: &ChunkRecord, include_text: bool) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            ordinal: chunk.ordinal,
            char_count: chunk.char_count,
            header: chunk.header.clone(),
            section_path: chunk.section_path.clone(),
            boundary: chunk.boundary.as_str().to_string(),
            page_nos: chunk.page_nos.clone(),
            text: include_text.then(|| chunk.text.clone()),
        }
    }
}

/// GET /documents/{id}/chunks response body.
#[derive(Debug, Serialize)]
pub struct DocumentChunksResponse {
    pub doc_id: String,
    pub filename: String,
    pub doc_type: String,
    pub chunk_count: usize,
    pub total_chars: usize,
    pub avg_chunk_size: usize,
    pub chunks: Vec<ChunkEntry>,
}

impl DocumentChunksResponse {
    pub fn build(record: &DocumentRecord, chunks: &[ChunkRecord], include_text: bool) -> Self {
        let total_chars: usize = chunks.iter().map(|c| c.char_count).sum();
        Self {
            doc_id: record.doc_id.clone(),
            filename: record.filename.clone(),
            doc_type: record.doc_type.as_str().to_string(),
            chunk_count: chunks.len(),
            total_chars,
            avg_chunk_size: if chunks.is_empty() {
                0
            } else {
                total_chars / chunks.len()
            },
            chunks: chunks
                .iter()
                .map(|c| ChunkEntry::from_chunk(c, include_text))
                .collect(),
        }
    }
}
