//! Chunking strategy trait and types

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::document::DocType;
use crate::domain::ingestion::parser::ParsedDocument;
use crate::domain::DomainError;

/// Semantic boundary a chunk was cut on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticBoundary {
    Article,
    Section,
    Paragraph,
    Row,
    Generic,
}

impl SemanticBoundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Section => "section",
            Self::Paragraph => "paragraph",
            Self::Row => "row",
            Self::Generic => "generic",
        }
    }
}

/// Chunker selection for one ingest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkerMode {
    Regulation,
    AuditReport,
    AuditIssue,
    Default,
    Smart,
}

impl ChunkerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regulation => "regulation",
            Self::AuditReport => "audit_report",
            Self::AuditIssue => "audit_issue",
            Self::Default => "default",
            Self::Smart => "smart",
        }
    }
}

impl std::str::FromStr for ChunkerMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regulation" => Ok(Self::Regulation),
            "audit_report" => Ok(Self::AuditReport),
            "audit_issue" => Ok(Self::AuditIssue),
            "default" => Ok(Self::Default),
            "smart" => Ok(Self::Smart),
            other => Err(DomainError::bad_request(format!(
                "unknown chunker_type: {other}"
            ))),
        }
    }
}

/// Configuration for chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerOptions {
    pub mode: ChunkerMode,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive fixed-length splits in characters.
    pub overlap: usize,
}

impl ChunkerOptions {
    pub fn new(mode: ChunkerMode) -> Self {
        Self {
            mode,
            chunk_size: 512,
            overlap: 50,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.chunk_size == 0 {
            return Err(DomainError::bad_request("chunk_size must be greater than 0"));
        }
        if self.overlap >= self.chunk_size {
            return Err(DomainError::bad_request(
                "overlap must be less than chunk_size",
            ));
        }
        Ok(())
    }
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self::new(ChunkerMode::Smart)
    }
}

/// A chunk as emitted by a chunking strategy, before document identity
/// is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub text: String,
    /// First line of the chunk.
    pub header: String,
    /// Ancestor headings from the structural splitters.
    pub section_path: Vec<String>,
    pub boundary: SemanticBoundary,
    /// 1-based pages the chunk text was drawn from.
    pub page_nos: Vec<u32>,
}

impl ChunkPiece {
    pub fn new(text: impl Into<String>, boundary: SemanticBoundary) -> Self {
        let text = text.into();
        let header = text.lines().next().unwrap_or_default().trim().to_string();
        Self {
            text,
            header,
            section_path: Vec::new(),
            boundary,
            page_nos: Vec::new(),
        }
    }

    pub fn with_section_path(mut self, section_path: Vec<String>) -> Self {
        self.section_path = section_path;
        self
    }

    pub fn with_page_nos(mut self, page_nos: Vec<u32>) -> Self {
        self.page_nos = page_nos;
        self
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A fully-identified chunk: the unit persisted in the vector store
/// metadata sidecar and referenced by graph evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// `{doc_id}:{ordinal}`, stable across restarts.
    pub chunk_id: String,
    pub doc_id: String,
    pub ordinal: usize,
    pub text: String,
    pub char_count: usize,
    pub page_nos: Vec<u32>,
    pub header: String,
    pub section_path: Vec<String>,
    pub boundary: SemanticBoundary,
    pub doc_type: DocType,
    pub title: String,
    pub filename: String,
}

impl ChunkRecord {
    pub fn from_piece(
        piece: ChunkPiece,
        ordinal: usize,
        doc_id: &str,
        doc_type: DocType,
        title: &str,
        filename: &str,
    ) -> Self {
        let char_count = piece.char_count();
        Self {
            chunk_id: format!("{doc_id}:{ordinal}"),
            doc_id: doc_id.to_string(),
            ordinal,
            text: piece.text,
            char_count,
            page_nos: piece.page_nos,
            header: piece.header,
            section_path: piece.section_path,
            boundary: piece.boundary,
            doc_type,
            title: title.to_string(),
            filename: filename.to_string(),
        }
    }

    /// Preview used in citations and graph browsing payloads.
    pub fn text_preview(&self, max_chars: usize) -> String {
        let preview: String = self.text.chars().take(max_chars).collect();
        if self.text.chars().count() > max_chars {
            format!("{preview}...")
        } else {
            preview
        }
    }
}

/// Trait for chunking strategies
pub trait ChunkingStrategy: Send + Sync + Debug {
    /// Split a parsed document into ordered chunk pieces.
    fn chunk(
        &self,
        parsed: &ParsedDocument,
        options: &ChunkerOptions,
    ) -> Result<Vec<ChunkPiece>, DomainError>;

    /// Get the strategy name
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_validation() {
        assert!(ChunkerOptions::new(ChunkerMode::Default).validate().is_ok());
        assert!(ChunkerOptions::new(ChunkerMode::Default)
            .with_chunk_size(0)
            .validate()
            .is_err());
        assert!(ChunkerOptions::new(ChunkerMode::Default)
            .with_chunk_size(100)
            .with_overlap(100)
            .validate()
            .is_err());
    }

    #[test]
    fn test_chunk_piece_header_is_first_line() {
        let piece = ChunkPiece::new("第一条 A内容。\n补充说明。", SemanticBoundary::Article);
        assert_eq!(piece.header, "第一条 A内容。");
    }

    #[test]
    fn test_chunk_record_id_format() {
        let piece = ChunkPiece::new("正文", SemanticBoundary::Paragraph);
        let record = ChunkRecord::from_piece(
            piece,
            3,
            "abcd1234abcd1234",
            DocType::InternalRegulation,
            "title",
            "file.txt",
        );
        assert_eq!(record.chunk_id, "abcd1234abcd1234:3");
        assert_eq!(record.char_count, 2);
    }

    #[test]
    fn test_text_preview_truncates() {
        let piece = ChunkPiece::new("x".repeat(300), SemanticBoundary::Generic);
        let record = ChunkRecord::from_piece(
            piece,
            0,
            "d",
            DocType::AuditIssue,
            "",
            "",
        );
        let preview = record.text_preview(220);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 223);
    }

    #[test]
    fn test_chunker_mode_parse() {
        assert_eq!("smart".parse::<ChunkerMode>().unwrap(), ChunkerMode::Smart);
        assert!("clever".parse::<ChunkerMode>().is_err());
    }
}
