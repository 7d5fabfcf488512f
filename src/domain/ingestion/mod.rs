//! Document ingestion domain types and traits
//!
//! This module provides:
//! - `DocumentParser` trait for extracting structured text from uploads
//! - `ChunkingStrategy` trait for splitting parsed documents into chunks
//! - Option types shared by the ingestion pipeline

pub mod chunker;
pub mod parser;

pub use chunker::{
    ChunkPiece, ChunkRecord, ChunkerMode, ChunkerOptions, ChunkingStrategy, SemanticBoundary,
};
pub use parser::{
    detect_format, Block, BlockKind, DocumentFormat, DocumentParser, ParsedDocument,
};

/// Per-request ingestion options (enumerated, no implicit kwargs).
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunker: ChunkerMode,
    pub doc_type: crate::domain::document::DocType,
    pub title: Option<String>,
    pub save_after: bool,
}

impl IngestOptions {
    pub fn new(chunker: ChunkerMode, doc_type: crate::domain::document::DocType) -> Self {
        Self {
            chunker,
            doc_type,
            title: None,
            save_after: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_save_after(mut self, save_after: bool) -> Self {
        self.save_after = save_after;
        self
    }
}
