//! Structure-aware chunking strategies
//!
//! Four strategies plus `smart` auto-selection:
//! - `regulation`: 第X章/第X节/第X条 clause structure
//! - `audit_report`: 一、/（一）/1. heading hierarchies
//! - `audit_issue`: one chunk per table-row record
//! - `default`: semantic paragraphs bounded by chunk size

mod audit_issue;
mod audit_report;
mod paragraph;
mod regulation;

pub use audit_issue::AuditIssueChunker;
pub use audit_report::AuditReportChunker;
pub use paragraph::ParagraphChunker;
pub use regulation::RegulationChunker;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::ingestion::{
    BlockKind, ChunkPiece, ChunkerMode, ChunkerOptions, ChunkingStrategy, ParsedDocument,
};
use crate::domain::DomainError;

/// Resolve a concrete strategy; `Smart` probes the document prefix.
pub fn strategy_for(mode: ChunkerMode, parsed: &ParsedDocument) -> Box<dyn ChunkingStrategy> {
    let resolved = match mode {
        ChunkerMode::Smart => detect_mode(parsed),
        other => other,
    };
    match resolved {
        ChunkerMode::Regulation => Box::new(RegulationChunker::new()),
        ChunkerMode::AuditReport => Box::new(AuditReportChunker::new()),
        ChunkerMode::AuditIssue => Box::new(AuditIssueChunker::new()),
        _ => Box::new(ParagraphChunker::new()),
    }
}

static REGULATION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第[一二三四五六七八九十百\d]+[章节条]").unwrap());

static REPORT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([一二三四五六七八九十]+、|（[一二三四五六七八九十]+）|\d{1,2}\.)").unwrap());

static ISSUE_ROW_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d{1,4}\s+\S").unwrap());

const ISSUE_KEYWORDS: [&str; 4] = ["整改情况", "问题摘要", "审计查出", "部门单位"];

/// Smart-mode auto-selection over a content prefix.
///
/// Deterministic probe order: audit_issue, regulation, audit_report,
/// default. The first matching heuristic wins.
pub fn detect_mode(parsed: &ParsedDocument) -> ChunkerMode {
    let text = parsed.full_text();
    let sample: String = text.chars().take(2000).collect();

    let has_row_blocks = parsed
        .blocks
        .iter()
        .take(20)
        .any(|b| b.kind == BlockKind::TableRow);
    let keyword_hits = ISSUE_KEYWORDS.iter().filter(|k| sample.contains(**k)).count();
    if has_row_blocks || keyword_hits >= 2 || (keyword_hits >= 1 && ISSUE_ROW_LINE.is_match(&sample))
    {
        return ChunkerMode::AuditIssue;
    }

    if REGULATION_MARKER.is_match(&sample) {
        return ChunkerMode::Regulation;
    }

    if REPORT_MARKER.is_match(&sample) || sample.contains("审计报告") {
        return ChunkerMode::AuditReport;
    }

    ChunkerMode::Default
}

/// Maps char offsets of the joined document text back to page numbers.
pub(crate) struct PageMap {
    /// (start char offset, page_no) per block, ascending.
    boundaries: Vec<(usize, u32)>,
    text: String,
}

impl PageMap {
    /// Join block texts with `\n` and remember where each page starts.
    pub fn build(parsed: &ParsedDocument) -> Self {
        let mut text = String::new();
        let mut boundaries = Vec::with_capacity(parsed.blocks.len());
        let mut offset = 0usize;
        for block in &parsed.blocks {
            if !text.is_empty() {
                text.push('\n');
                offset += 1;
            }
            boundaries.push((offset, block.page_no));
            text.push_str(&block.text);
            offset += block.text.chars().count();
        }
        Self { boundaries, text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Pages overlapped by the char range `[start, end)`.
    pub fn pages_in_range(&self, start: usize, end: usize) -> Vec<u32> {
        let mut pages = Vec::new();
        for (i, &(block_start, page)) in self.boundaries.iter().enumerate() {
            let block_end = self
                .boundaries
                .get(i + 1)
                .map(|&(next, _)| next)
                .unwrap_or(usize::MAX);
            if block_start < end && block_end > start && !pages.contains(&page) {
                pages.push(page);
            }
        }
        pages.sort_unstable();
        pages
    }
}

/// Sentence terminators considered by the backoff split.
const SENTENCE_ENDS: [char; 7] = ['。', '；', '！', '？', '.', ';', '\n'];

/// Split `text` into pieces of at most `chunk_size` chars, backing off
/// to the nearest sentence terminator within half a chunk of the cut.
/// Pieces after the first start with the last `overlap` chars of their
/// predecessor.
pub(crate) fn split_fixed_with_overlap(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let hard_end = (start + chunk_size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            // Back off to a sentence boundary, but never past half a chunk.
            let lookback_floor = start + chunk_size / 2;
            let mut cut = hard_end;
            for i in (lookback_floor..hard_end).rev() {
                if SENTENCE_ENDS.contains(&chars[i]) {
                    cut = i + 1;
                    break;
                }
            }
            cut
        };

        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            if pieces.is_empty() || overlap == 0 {
                pieces.push(piece);
            } else {
                let tail_start = start.saturating_sub(overlap);
                let prefix: String = chars[tail_start..start].iter().collect();
                pieces.push(format!("{prefix}{piece}"));
            }
        }
        start = end;
    }
    pieces
}

/// Shared guard: a chunker never emits empty pieces, and every piece
/// stays under `2 × chunk_size` characters.
pub(crate) fn enforce_piece_invariants(
    pieces: Vec<ChunkPiece>,
    options: &ChunkerOptions,
) -> Result<Vec<ChunkPiece>, DomainError> {
    let limit = options.chunk_size * 2;
    let pieces: Vec<ChunkPiece> = pieces
        .into_iter()
        .filter(|p| !p.text.trim().is_empty())
        .collect();
    for piece in &pieces {
        if piece.char_count() > limit {
            return Err(DomainError::chunk(format!(
                "chunk of {} chars exceeds limit {}",
                piece.char_count(),
                limit
            )));
        }
    }
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingestion::Block;

    fn doc(text: &str) -> ParsedDocument {
        ParsedDocument::new(vec![Block::paragraph(text, 1)])
    }

    #[test]
    fn test_detect_regulation() {
        let parsed = doc("第一条 A内容。第二条 B内容。");
        assert_eq!(detect_mode(&parsed), ChunkerMode::Regulation);
    }

    #[test]
    fn test_detect_audit_issue_by_keywords() {
        let parsed = doc("部门单位: 财政部\n问题摘要: 预算执行不到位\n整改情况: 已整改");
        assert_eq!(detect_mode(&parsed), ChunkerMode::AuditIssue);
    }

    #[test]
    fn test_issue_wins_over_regulation() {
        // Contains both issue keywords and clause markers; issue probes first.
        let parsed = doc("审计查出问题整改情况\n问题摘要: 违反第三条规定\n部门单位: 某局");
        assert_eq!(detect_mode(&parsed), ChunkerMode::AuditIssue);
    }

    #[test]
    fn test_detect_audit_report() {
        let parsed = doc("一、基本情况\n本年度预算执行良好。\n（一）收入情况\n详见附表。");
        assert_eq!(detect_mode(&parsed), ChunkerMode::AuditReport);
    }

    #[test]
    fn test_detect_default() {
        let parsed = doc("这是一段没有任何结构标记的普通文本。");
        assert_eq!(detect_mode(&parsed), ChunkerMode::Default);
    }

    #[test]
    fn test_page_map_ranges() {
        let parsed = ParsedDocument::new(vec![
            Block::paragraph("0123456789", 1),
            Block::paragraph("abcdefghij", 2),
        ]);
        let map = PageMap::build(&parsed);
        assert_eq!(map.pages_in_range(0, 5), vec![1]);
        assert_eq!(map.pages_in_range(12, 15), vec![2]);
        assert_eq!(map.pages_in_range(8, 15), vec![1, 2]);
    }

    #[test]
    fn test_split_backs_off_to_sentence() {
        let text = "一句话。第二句比较长一些。第三句话。";
        let pieces = split_fixed_with_overlap(text, 10, 0);
        assert!(pieces.len() >= 2);
        assert!(pieces[0].ends_with('。'));
    }

    #[test]
    fn test_split_overlap_duplicates_tail() {
        let text = "a".repeat(30);
        let pieces = split_fixed_with_overlap(&text, 10, 4);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[1].len(), 14);
    }

    #[test]
    fn test_split_roundtrip_without_overlap() {
        let text = "第一句。第二句。第三句。第四句。第五句。第六句。";
        let pieces = split_fixed_with_overlap(text, 8, 0);
        let joined: String = pieces.concat();
        assert_eq!(joined, text);
    }
}
