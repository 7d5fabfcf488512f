//! PDF parser built on lopdf

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::ingestion::{Block, DocumentFormat, DocumentParser, ParsedDocument};
use crate::domain::DomainError;

/// A table row begins with a row index followed by an organisational
/// unit name (部/委/局/中心/大学/学院/院/办).
static ROW_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,4})\s+([一-龥]{2,}(?:部|委|局|中心|大学|学院|院|办))").unwrap()
});

static HEADING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(第[一二三四五六七八九十百\d]+[章节]|[一二三四五六七八九十]+、|（[一二三四五六七八九十]+）)").unwrap()
});

/// Lines that belong to a table header, not to a data row.
static TABLE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"序号|问题摘要|整改情况|部门单位").unwrap());

/// Parser for `.pdf` uploads.
///
/// Extracts text per page and reconstructs tables as logically
/// aggregated rows: one `TableRow` block per semantic row, with
/// continuation lines folded into the row that opened them.
#[derive(Debug, Default)]
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }

    fn blocks_from_page(text: &str, page_no: u32, blocks: &mut Vec<Block>) {
        let mut paragraph = String::new();
        let mut row: Option<String> = None;

        let flush_paragraph = |paragraph: &mut String, blocks: &mut Vec<Block>| {
            if !paragraph.trim().is_empty() {
                blocks.push(Block::paragraph(paragraph.trim().to_string(), page_no));
            }
            paragraph.clear();
        };
        let flush_row = |row: &mut Option<String>, blocks: &mut Vec<Block>| {
            if let Some(text) = row.take() {
                if !text.trim().is_empty() {
                    blocks.push(Block::table_row(text.trim().to_string(), page_no));
                }
            }
        };

        for line in text.lines() {
            let trimmed = line.trim_end();
            if trimmed.trim().is_empty() {
                flush_row(&mut row, blocks);
                flush_paragraph(&mut paragraph, blocks);
                continue;
            }

            if ROW_START.is_match(trimmed) && !TABLE_HEADER.is_match(trimmed) {
                flush_row(&mut row, blocks);
                flush_paragraph(&mut paragraph, blocks);
                row = Some(Self::normalize_row(trimmed));
                continue;
            }

            if let Some(current) = row.as_mut() {
                // Continuation of the row that opened above.
                current.push(' ');
                current.push_str(trimmed.trim());
                continue;
            }

            if HEADING_LINE.is_match(trimmed.trim()) && trimmed.trim().chars().count() <= 40 {
                flush_paragraph(&mut paragraph, blocks);
                blocks.push(Block::heading(trimmed.trim().to_string(), page_no));
                continue;
            }

            if !paragraph.is_empty() {
                paragraph.push('\n');
            }
            paragraph.push_str(trimmed);
        }

        flush_row(&mut row, blocks);
        flush_paragraph(&mut paragraph, blocks);
    }

    /// Collapse wide whitespace runs into cell separators.
    fn normalize_row(line: &str) -> String {
        static CELL_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
        CELL_GAP.replace_all(line.trim(), " | ").into_owned()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument, DomainError> {
        let document = lopdf::Document::load_mem(bytes)
            .map_err(|e| DomainError::parse(format!("{filename}: {e}")))?;

        let mut blocks = Vec::new();
        for (page_no, _object_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|e| DomainError::parse(format!("{filename} page {page_no}: {e}")))?;
            if text.trim().is_empty() {
                continue;
            }
            Self::blocks_from_page(&text, page_no, &mut blocks);
        }

        if blocks.is_empty() {
            return Err(DomainError::parse(format!(
                "{filename}: no readable page text"
            )));
        }

        Ok(ParsedDocument::new(blocks))
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }
}
