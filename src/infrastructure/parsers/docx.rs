//! DOCX parser: OOXML unpack + paragraph/style extraction

use std::io::Read;

use quick_xml::events::Event;

use crate::domain::ingestion::{Block, BlockKind, DocumentFormat, DocumentParser, ParsedDocument};
use crate::domain::DomainError;

/// Upper bound on the unpacked document.xml size.
const MAX_XML_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Parser for `.docx` uploads.
///
/// Reads `word/document.xml` out of the OOXML container and walks the
/// paragraph stream. Paragraphs styled `Heading*` (or the Chinese
/// builtin `标题`) become heading blocks. DOCX carries no fixed page
/// geometry, so every block reports page 1.
#[derive(Debug, Default)]
pub struct DocxParser;

impl DocxParser {
    pub fn new() -> Self {
        Self
    }

    fn read_document_xml(bytes: &[u8], filename: &str) -> Result<Vec<u8>, DomainError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| DomainError::parse(format!("{filename}: {e}")))?;
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| DomainError::parse(format!("{filename}: word/document.xml not found")))?;

        let mut xml = Vec::new();
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut xml)
            .map_err(|e| DomainError::parse(format!("{filename}: {e}")))?;
        if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(DomainError::parse(format!(
                "{filename}: word/document.xml exceeds size limit"
            )));
        }
        Ok(xml)
    }

    fn style_is_heading(style: &str) -> bool {
        style.starts_with("Heading") || style.starts_with("heading") || style.starts_with("标题")
    }

    fn blocks_from_xml(xml: &[u8], filename: &str) -> Result<Vec<Block>, DomainError> {
        let mut reader = quick_xml::Reader::from_reader(xml);
        reader.config_mut().trim_text(false);

        let mut blocks = Vec::new();
        let mut buf = Vec::new();
        let mut in_text = false;
        let mut paragraph = String::new();
        let mut kind = BlockKind::Paragraph;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"p" => {
                        paragraph.clear();
                        kind = BlockKind::Paragraph;
                    }
                    b"t" => in_text = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => {
                    if e.local_name().as_ref() == b"pStyle" {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"val" {
                                let style = String::from_utf8_lossy(&attr.value).into_owned();
                                if Self::style_is_heading(&style) {
                                    kind = BlockKind::Heading;
                                }
                            }
                        }
                    }
                }
                Ok(Event::Text(t)) => {
                    if in_text {
                        paragraph.push_str(
                            t.unescape()
                                .map_err(|e| DomainError::parse(format!("{filename}: {e}")))?
                                .as_ref(),
                        );
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"p" => {
                        let text = paragraph.trim();
                        if !text.is_empty() {
                            blocks.push(Block::new(text.to_string(), 1, kind));
                        }
                        paragraph.clear();
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(DomainError::parse(format!("{filename}: {e}"))),
                _ => {}
            }
            buf.clear();
        }

        Ok(blocks)
    }
}

impl DocumentParser for DocxParser {
    fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument, DomainError> {
        let xml = Self::read_document_xml(bytes, filename)?;
        let blocks = Self::blocks_from_xml(&xml, filename)?;
        if blocks.is_empty() {
            return Err(DomainError::parse(format!("{filename}: empty document")));
        }
        Ok(ParsedDocument::new(blocks))
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p>
      <w:pPr><w:pStyle w:val="Heading1"/></w:pPr>
      <w:r><w:t>第一章 总则</w:t></w:r>
    </w:p>
    <w:p><w:r><w:t>第一条 为规范管理，</w:t></w:r><w:r><w:t>制定本办法。</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve"> </w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn test_heading_style_detected() {
        let blocks = DocxParser::blocks_from_xml(SAMPLE.as_bytes(), "规定.docx").unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Heading);
        assert_eq!(blocks[0].text, "第一章 总则");
    }

    #[test]
    fn test_runs_are_joined_within_paragraph() {
        let blocks = DocxParser::blocks_from_xml(SAMPLE.as_bytes(), "规定.docx").unwrap();
        assert_eq!(blocks[1].text, "第一条 为规范管理，制定本办法。");
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
    }

    #[test]
    fn test_not_a_zip_rejected() {
        let result = DocxParser::new().parse(b"plain bytes", "x.docx");
        assert!(matches!(result, Err(DomainError::Parse { .. })));
    }

    #[test]
    fn test_heading_style_names() {
        assert!(DocxParser::style_is_heading("Heading2"));
        assert!(DocxParser::style_is_heading("标题 1"));
        assert!(!DocxParser::style_is_heading("Normal"));
    }
}
