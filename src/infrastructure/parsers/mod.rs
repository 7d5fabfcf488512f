//! Format-specific document parsers

mod docx;
mod pdf;
mod plain_text;

pub use docx::DocxParser;
pub use pdf::PdfParser;
pub use plain_text::PlainTextParser;

use crate::domain::ingestion::{detect_format, DocumentFormat, DocumentParser};
use crate::domain::DomainError;

/// Select a parser from the declared filename extension.
pub fn parser_for(filename: &str) -> Result<Box<dyn DocumentParser>, DomainError> {
    match detect_format(filename) {
        Some(DocumentFormat::Pdf) => Ok(Box::new(PdfParser::new())),
        Some(DocumentFormat::Docx) => Ok(Box::new(DocxParser::new())),
        Some(DocumentFormat::Txt) => Ok(Box::new(PlainTextParser::new())),
        None => Err(DomainError::parse(format!(
            "unsupported file type: {filename}"
        ))),
    }
}
