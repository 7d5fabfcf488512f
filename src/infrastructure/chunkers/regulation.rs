//! Regulation chunker: 第X章 / 第X节 / 第X条 clause structure

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::ingestion::{
    ChunkPiece, ChunkerOptions, ChunkingStrategy, ParsedDocument, SemanticBoundary,
};
use crate::domain::DomainError;

use super::{enforce_piece_invariants, split_fixed_with_overlap, PageMap};

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第[一二三四五六七八九十百千\d]+[章节条]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq)]
enum MarkerKind {
    Chapter,
    Section,
    Article,
}

struct Segment {
    start: usize,
    text: String,
    kind: MarkerKind,
}

/// Splits regulation text on clause markers, keeping sub-enumerations
/// (（一）…) attached to their parent clause.
#[derive(Debug, Default)]
pub struct RegulationChunker;

impl RegulationChunker {
    pub fn new() -> Self {
        Self
    }

    /// A marker only opens a segment at text start, after a newline, or
    /// after sentence punctuation. Inline references (依据第三条) stay put.
    fn accepts_marker_at(chars: &[char], char_pos: usize) -> bool {
        if char_pos == 0 {
            return true;
        }
        matches!(
            chars[char_pos - 1],
            '\n' | '。' | '；' | ';' | ' ' | '\u{3000}' | '\t'
        )
    }

    fn marker_kind(marker: &str) -> MarkerKind {
        if marker.ends_with('章') {
            MarkerKind::Chapter
        } else if marker.ends_with('节') {
            MarkerKind::Section
        } else {
            MarkerKind::Article
        }
    }

    fn segments(text: &str) -> Vec<Segment> {
        let chars: Vec<char> = text.chars().collect();
        // Byte offset -> char offset lookup for regex match positions.
        let mut char_of_byte = vec![0usize; text.len() + 1];
        for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
            char_of_byte[byte_idx] = char_idx;
        }
        char_of_byte[text.len()] = chars.len();

        let mut starts: Vec<(usize, MarkerKind)> = Vec::new();
        for m in MARKER.find_iter(text) {
            let char_pos = char_of_byte[m.start()];
            if Self::accepts_marker_at(&chars, char_pos) {
                starts.push((char_pos, Self::marker_kind(m.as_str())));
            }
        }

        let mut segments = Vec::new();
        if starts.is_empty() {
            segments.push(Segment {
                start: 0,
                text: text.to_string(),
                kind: MarkerKind::Article,
            });
            return segments;
        }

        if starts[0].0 > 0 {
            let preamble: String = chars[..starts[0].0].iter().collect();
            if !preamble.trim().is_empty() {
                segments.push(Segment {
                    start: 0,
                    text: preamble,
                    kind: MarkerKind::Article,
                });
            }
        }

        for (i, &(start, kind)) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map(|&(s, _)| s).unwrap_or(chars.len());
            let body: String = chars[start..end].iter().collect();
            if !body.trim().is_empty() {
                segments.push(Segment {
                    start,
                    text: body,
                    kind,
                });
            }
        }
        segments
    }
}

impl ChunkingStrategy for RegulationChunker {
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
        let mut chapter: Option<String> = None;
        let mut section: Option<String> = None;
        // Heading-only fragment carried forward into the next chunk.
        let mut pending: Option<(String, usize)> = None;

        for segment in &segments {
            let header_line = segment
                .text
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();

            let ancestor_path: Vec<String> = match segment.kind {
                MarkerKind::Chapter => Vec::new(),
                MarkerKind::Section => chapter.iter().cloned().collect(),
                MarkerKind::Article => chapter
                    .iter()
                    .chain(section.iter())
                    .cloned()
                    .collect(),
            };

            match segment.kind {
                MarkerKind::Chapter => {
                    chapter = Some(header_line.clone());
                    section = None;
                }
                MarkerKind::Section => {
                    section = Some(header_line.clone());
                }
                MarkerKind::Article => {}
            }

            let body_len = segment.text.chars().count()
                - header_line.chars().count().min(segment.text.chars().count());
            let is_heading_fragment = matches!(segment.kind, MarkerKind::Chapter | MarkerKind::Section)
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

            let boundary = match segment.kind {
                MarkerKind::Article => SemanticBoundary::Article,
                _ => SemanticBoundary::Section,
            };

            let range_end = range_start + full_text.chars().count();
            if full_text.chars().count() > options.chunk_size {
                for sub in split_fixed_with_overlap(&full_text, options.chunk_size, 0) {
                    let piece = ChunkPiece::new(sub.trim().to_string(), SemanticBoundary::Paragraph)
                        .with_section_path(ancestor_path.clone())
                        .with_page_nos(map.pages_in_range(range_start, range_end));
                    pieces.push(piece);
                }
            } else {
                let piece = ChunkPiece::new(full_text.trim().to_string(), boundary)
                    .with_section_path(ancestor_path)
                    .with_page_nos(map.pages_in_range(range_start, range_end));
                pieces.push(piece);
            }
        }

        // A trailing heading with nothing after it still becomes a chunk.
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
        "regulation"
    }
}
