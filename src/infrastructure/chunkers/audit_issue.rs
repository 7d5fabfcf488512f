//! Audit issue chunker: one chunk per table-row record

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::ingestion::{
    BlockKind, ChunkPiece, ChunkerOptions, ChunkingStrategy, ParsedDocument, SemanticBoundary,
};
use crate::domain::DomainError;

use super::enforce_piece_invariants;

static ROW_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d{1,4}\s+\S").unwrap());
static CELL_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}|\s*\|\s*").unwrap());

/// Emits one chunk per rectification-ledger row, labelling the cells
/// (序号 | 部门 | 问题摘要 | 整改情况) when the column layout matches.
#[derive(Debug, Default)]
pub struct AuditIssueChunker;

impl AuditIssueChunker {
    pub fn new() -> Self {
        Self
    }

    /// Format a raw row into a labelled record.
    fn format_row(row: &str) -> String {
        let cells: Vec<String> = CELL_GAP
            .split(row.trim())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if cells.len() >= 4 {
            let mut formatted = format!(
                "问题序号: {}\n部门单位: {}\n问题摘要: {}\n整改情况: {}",
                cells[0], cells[1], cells[2], cells[3]
            );
            if cells.len() > 4 {
                formatted.push_str(&format!("\n补充信息: {}", cells[4..].join(" | ")));
            }
            formatted
        } else {
            row.trim().to_string()
        }
    }
}

impl ChunkingStrategy for AuditIssueChunker {
    fn chunk(
        &self,
        parsed: &ParsedDocument,
        options: &ChunkerOptions,
    ) -> Result<Vec<ChunkPiece>, DomainError> {
        options.validate()?;
        let mut pieces: Vec<ChunkPiece> = Vec::new();

        for block in &parsed.blocks {
            match block.kind {
                BlockKind::TableRow => {
                    pieces.push(
                        ChunkPiece::new(Self::format_row(&block.text), SemanticBoundary::Row)
                            .with_page_nos(vec![block.page_no]),
                    );
                }
                BlockKind::Heading => {
                    pieces.push(
                        ChunkPiece::new(block.text.trim().to_string(), SemanticBoundary::Section)
                            .with_page_nos(vec![block.page_no]),
                    );
                }
                BlockKind::Paragraph => {
                    // Text uploads carry rows as plain lines; re-detect them.
                    let mut current: Option<String> = None;
                    let mut preamble = String::new();
                    for line in block.text.lines() {
                        if ROW_LINE.is_match(line) {
                            if let Some(row) = current.take() {
                                pieces.push(
                                    ChunkPiece::new(Self::format_row(&row), SemanticBoundary::Row)
                                        .with_page_nos(vec![block.page_no]),
                                );
                            }
                            if !preamble.trim().is_empty() {
                                pieces.push(
                                    ChunkPiece::new(
                                        preamble.trim().to_string(),
                                        SemanticBoundary::Generic,
                                    )
                                    .with_page_nos(vec![block.page_no]),
                                );
                                preamble.clear();
                            }
                            current = Some(line.to_string());
                        } else if let Some(row) = current.as_mut() {
                            row.push(' ');
                            row.push_str(line.trim());
                        } else {
                            if !preamble.is_empty() {
                                preamble.push('\n');
                            }
                            preamble.push_str(line);
                        }
                    }
                    if let Some(row) = current.take() {
                        pieces.push(
                            ChunkPiece::new(Self::format_row(&row), SemanticBoundary::Row)
                                .with_page_nos(vec![block.page_no]),
                        );
                    }
                    if !preamble.trim().is_empty() {
                        pieces.push(
                            ChunkPiece::new(preamble.trim().to_string(), SemanticBoundary::Generic)
                                .with_page_nos(vec![block.page_no]),
                        );
                    }
                }
            }
        }

        enforce_piece_invariants(pieces, options)
    }

    fn name(&self) -> &'static str {
        "audit_issue"
    }
}
