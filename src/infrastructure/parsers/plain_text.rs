//! Plain text parser

use crate::domain::ingestion::{Block, DocumentFormat, DocumentParser, ParsedDocument};
use crate::domain::DomainError;

/// Parser for `.txt` uploads.
///
/// Groups runs of non-empty lines into paragraph blocks; blank lines
/// separate blocks. Everything lands on page 1.
#[derive(Debug, Default)]
pub struct PlainTextParser;

impl PlainTextParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for PlainTextParser {
    fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument, DomainError> {
        let text = match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            // Tolerate mis-declared encodings rather than rejecting the upload.
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        };

        if text.trim().is_empty() {
            return Err(DomainError::parse(format!("{filename}: empty document")));
        }

        let mut blocks = Vec::new();
        let mut current = String::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    blocks.push(Block::paragraph(std::mem::take(&mut current), 1));
                }
            } else {
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line.trim_end());
            }
        }
        if !current.is_empty() {
            blocks.push(Block::paragraph(current, 1));
        }

        Ok(ParsedDocument::new(blocks))
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Txt
    }
}
