//! Default chunker: semantic paragraphs bounded by chunk size

use crate::domain::ingestion::{
    ChunkPiece, ChunkerOptions, ChunkingStrategy, ParsedDocument, SemanticBoundary,
};
use crate::domain::DomainError;

use super::{enforce_piece_invariants, split_fixed_with_overlap};

/// Accumulates whole paragraphs up to `chunk_size`; a single oversized
/// paragraph falls back to fixed-length splitting with `overlap`
/// characters carried between the splits.
#[derive(Debug, Default)]
pub struct ParagraphChunker;

impl ParagraphChunker {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkingStrategy for ParagraphChunker {
    fn chunk(
        &self,
        parsed: &ParsedDocument,
        options: &ChunkerOptions,
    ) -> Result<Vec<ChunkPiece>, DomainError> {
        options.validate()?;

        let mut pieces: Vec<ChunkPiece> = Vec::new();
        let mut buffer = String::new();
        let mut buffer_pages: Vec<u32> = Vec::new();

        let flush = |buffer: &mut String, pages: &mut Vec<u32>, pieces: &mut Vec<ChunkPiece>| {
            if !buffer.trim().is_empty() {
                pages.sort_unstable();
                pages.dedup();
                pieces.push(
                    ChunkPiece::new(buffer.trim().to_string(), SemanticBoundary::Paragraph)
                        .with_page_nos(std::mem::take(pages)),
                );
            }
            buffer.clear();
        };

        for block in &parsed.blocks {
            let text = block.text.trim();
            if text.is_empty() {
                continue;
            }
            let block_len = text.chars().count();

            if block_len > options.chunk_size {
                flush(&mut buffer, &mut buffer_pages, &mut pieces);
                for sub in split_fixed_with_overlap(text, options.chunk_size, options.overlap) {
                    pieces.push(
                        ChunkPiece::new(sub.trim().to_string(), SemanticBoundary::Generic)
                            .with_page_nos(vec![block.page_no]),
                    );
                }
                continue;
            }

            let buffered = buffer.chars().count();
            if buffered > 0 && buffered + 1 + block_len > options.chunk_size {
                flush(&mut buffer, &mut buffer_pages, &mut pieces);
            }

            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(text);
            if !buffer_pages.contains(&block.page_no) {
                buffer_pages.push(block.page_no);
            }
        }
        flush(&mut buffer, &mut buffer_pages, &mut pieces);

        enforce_piece_invariants(pieces, options)
    }

    fn name(&self) -> &'static str {
        "default"
    }
}
