//! Document parser trait and block model

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;

/// Structural role of a parsed text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading,
    TableRow,
}

/// One contiguous text block with its source page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    /// 1-based page number the block was read from.
    pub page_no: u32,
    pub kind: BlockKind,
}

impl Block {
    pub fn new(text: impl Into<String>, page_no: u32, kind: BlockKind) -> Self {
        Self {
            text: text.into(),
            page_no,
            kind,
        }
    }

    pub fn paragraph(text: impl Into<String>, page_no: u32) -> Self {
        Self::new(text, page_no, BlockKind::Paragraph)
    }

    pub fn heading(text: impl Into<String>, page_no: u32) -> Self {
        Self::new(text, page_no, BlockKind::Heading)
    }

    pub fn table_row(text: impl Into<String>, page_no: u32) -> Self {
        Self::new(text, page_no, BlockKind::TableRow)
    }
}

/// Ordered block sequence produced by a parser.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub blocks: Vec<Block>,
}

impl ParsedDocument {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.text.trim().is_empty())
    }

    /// Concatenated text of all blocks, newline separated.
    pub fn full_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&block.text);
        }
        out
    }

    pub fn page_count(&self) -> u32 {
        self.blocks.iter().map(|b| b.page_no).max().unwrap_or(0)
    }
}

/// Supported upload formats, detected from the declared extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
        }
    }
}

/// Detect the parser format from a filename extension.
pub fn detect_format(filename: &str) -> Option<DocumentFormat> {
    let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(DocumentFormat::Pdf),
        "docx" => Some(DocumentFormat::Docx),
        "txt" | "text" | "md" => Some(DocumentFormat::Txt),
        _ => None,
    }
}

/// Trait for format-specific document parsers.
///
/// A parser either yields the complete block sequence or fails with
/// `DomainError::Parse`; it never partially commits.
pub trait DocumentParser: Send + Sync + Debug {
    /// Parse raw file bytes into an ordered block sequence.
    fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument, DomainError>;

    /// Format handled by this parser.
    fn format(&self) -> DocumentFormat;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("regs.txt"), Some(DocumentFormat::Txt));
        assert_eq!(detect_format("报告.PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(detect_format("制度.docx"), Some(DocumentFormat::Docx));
        assert_eq!(detect_format("archive.tar.gz"), None);
        assert_eq!(detect_format("noext"), None);
    }

    #[test]
    fn test_full_text_preserves_order() {
        let parsed = ParsedDocument::new(vec![
            Block::heading("第一章 总则", 1),
            Block::paragraph("第一条 内容。", 1),
            Block::paragraph("第二条 内容。", 2),
        ]);
        assert_eq!(parsed.full_text(), "第一章 总则\n第一条 内容。\n第二条 内容。");
        assert_eq!(parsed.page_count(), 2);
    }

    #[test]
    fn test_empty_detection() {
        assert!(ParsedDocument::default().is_empty());
        assert!(ParsedDocument::new(vec![Block::paragraph("  ", 1)]).is_empty());
        assert!(!ParsedDocument::new(vec![Block::paragraph("x", 1)]).is_empty());
    }
}
