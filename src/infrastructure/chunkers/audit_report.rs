//! Audit report chunker: 一、/（一）/1. heading hierarchies

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::ingestion::{
    ChunkPiece, ChunkerOptions, ChunkingStrategy, ParsedDocument, SemanticBoundary,
};
use crate::domain::DomainError;

use super::{enforce_piece_invariants, split_fixed_with_overlap, PageMap};

static LEVEL1: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[一二三四五六七八九十]+、").unwrap());
static LEVEL2: Lazy<Regex> = Lazy::new(|| Regex::new(r"^（[一二三四五六七八九十]+）").unwrap());
static LEVEL3: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}[\.、]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Top,
    Middle,
    Numbered,
    Body,
}

fn level_of(line: &str) -> Level {
    let trimmed = line.trim_start();
    if LEVEL1.is_match(trimmed) {
        Level::Top
    } else if LEVEL2.is_match(trimmed) {
        Level::Middle
    } else if LEVEL3.is_match(trimmed) {
        Level::Numbered
    } else {
        Level::Body
    }
}

struct Segment {
    start: usize,
    text: String,
    level: Level,
    header: String,
}

/// Splits audit report text on the 一、/（一）/1. numbering hierarchy.
#[derive(Debug, Default)]
pub struct AuditReportChunker;

impl AuditReportChunker {
    pub fn new() -> Self {
        Self
    }

    fn segments(text: &str) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut offset = 0usize;

        for line in text.split_inclusive('\n') {
            let line_chars = line.chars().count();
            let level = level_of(line);
            let open_new = level != Level::Body || segments.is_empty();
            if open_new {
                segments.push(Segment {
                    start: offset,
                    text: line.to_string(),
                    level: if segments.is_empty() && level == Level::Body {
                        Level::Body
                    } else {
                        level
                    },
                    header: line.trim().to_string(),
                });
            } else if let Some(last) = segments.last_mut() {
                last.text.push_str(line);
            }
            offset += line_chars;
        }
        segments
    }
}

impl ChunkingStrategy for AuditReportChunker {
    fn chunk(
        &self,
        parsed: &ParsedDocument,
        options: &ChunkerOptions,
    ) -> Result<Vec<ChunkPiece>, DomainError> {
        options.validate()?;
        let map = PageMap::build(parsed);
        let segments = Self::segments(map.text());

        let merge_threshold = options.chunk_size / 4;
        let mut pieces: Vec<ChunkPiece> = Vec::new();
        let mut top: Option<String> = None;
        let mut middle: Option<String> = None;
        let mut pending: Option<(String, usize)> = None;

        for segment in &segments {
            let ancestors: Vec<String> = match segment.level {
                Level::Top | Level::Body => Vec::new(),
                Level::Middle => top.iter().cloned().collect(),
                Level::Numbered => top.iter().chain(middle.iter()).cloned().collect(),
            };

            match segment.level {
                Level::Top => {
                    top = Some(segment.header.clone());
                    middle = None;
                }
                Level::Middle => {
                    middle = Some(segment.header.clone());
                }
                _ => {}
            }

            let body_len = segment
                .text
                .chars()
                .count()
                .saturating_sub(segment.header.chars().count());
            let is_heading_fragment = matches!(segment.level, Level::Top | Level::Middle)
                && body_len < merge_threshold;
            if is_heading_fragment {
                let (mut text, start) = pending.take().unwrap_or((String::new(), segment.start));
                text.push_str(&segment.text);
                pending = Some((text, start));
                continue;
            }

            let (full_text, range_start) = match pending.take() {
                Some((mut prefix, start)) => {
                    prefix.push_str(&segment.text);
                    (prefix, start)
                }
                None => (segment.text.clone(), segment.start),
            };

            let boundary = match segment.level {
                Level::Top | Level::Middle => SemanticBoundary::Section,
                Level::Numbered => SemanticBoundary::Paragraph,
                Level::Body => SemanticBoundary::Generic,
            };

            let range_end = range_start + full_text.chars().count();
            if full_text.chars().count() > options.chunk_size {
                for sub in split_fixed_with_overlap(&full_text, options.chunk_size, 0) {
                    pieces.push(
                        ChunkPiece::new(sub.trim().to_string(), SemanticBoundary::Paragraph)
                            .with_section_path(ancestors.clone())
                            .with_page_nos(map.pages_in_range(range_start, range_end)),
                    );
                }
            } else {
                pieces.push(
                    ChunkPiece::new(full_text.trim().to_string(), boundary)
                        .with_section_path(ancestors)
                        .with_page_nos(map.pages_in_range(range_start, range_end)),
                );
            }
        }

        if let Some((text, start)) = pending.take() {
            let end = start + text.chars().count();
            pieces.push(
                ChunkPiece::new(text.trim().to_string(), SemanticBoundary::Section)
                    .with_page_nos(map.pages_in_range(start, end)),
            );
        }

        enforce_piece_invariants(pieces, options)
    }

    fn name(&self) -> &'static str {
        "audit_report"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingestion::Block;

    fn doc(text: &str) -> ParsedDocument {
        ParsedDocument::new(vec![Block::paragraph(text, 1)])
    }

    fn opts() -> ChunkerOptions {
        ChunkerOptions::new(crate::domain::ingestion::ChunkerMode::AuditReport)
    }

    #[test]
    fn test_hierarchy_segments() {
        let pad = "情况说明。".repeat(30);
        let text = format!(
            "一、基本情况\n{pad}\n（一）收入情况\n{pad}\n1. 税收收入完成良好。\n二、审计发现\n{pad}"
        );
        let pieces = AuditReportChunker::new()
            .chunk(&doc(&text), &opts().with_chunk_size(600))
            .unwrap();
        let numbered = pieces
            .iter()
            .find(|p| p.text.starts_with("1."))
            .expect("numbered item");
        assert_eq!(
            numbered.section_path,
            vec!["一、基本情况".to_string(), "（一）收入情况".to_string()]
        );
    }

    #[test]
    fn test_short_heading_merges_into_body() {
        let text = "一、基本情况\n（一）收入\n本年度收入完成预算的百分之一百零三。";
        let pieces = AuditReportChunker::new().chunk(&doc(text), &opts()).unwrap();
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].text.contains("一、基本情况"));
        assert!(pieces[0].text.contains("收入完成预算"));
    }

    #[test]
    fn test_leading_prose_kept() {
        let text = "审计报告正文开头说明。\n一、基本情况\n内容充实，情况良好，说明足够长不会被合并进其他块，因为超过了四分之一阈值限制要求的字符数量下限要求。\n";
        let pieces = AuditReportChunker::new()
            .chunk(&doc(text), &opts().with_chunk_size(128))
            .unwrap();
        assert!(pieces[0].text.contains("审计报告正文开头说明。"));
    }

    #[test]
    fn test_round_trip() {
        let text = "一、基本情况\n本年度预算执行总体良好，未见重大违规事项，具体见下。\n二、问题\n个别项目执行进度滞后，资金拨付不及时。";
        let pieces = AuditReportChunker::new().chunk(&doc(text), &opts()).unwrap();
        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        let rebuilt: String = pieces.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(strip(&rebuilt), strip(text));
    }
}
