//! Lightweight entity normalization for graph canonical IDs
//!
//! Extractor output is noisy: label prefixes, stray punctuation,
//! full-width whitespace, and well-known department aliases. Every
//! entity name is normalized here before a node identity is hashed,
//! so spelling variants coalesce into one canonical graph node.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::graph::NodeType;

/// Alias → canonical department name. Exact matches win; otherwise an
/// alias contained in the text resolves to its canonical form.
const DEPARTMENT_ALIAS: &[(&str, &str)] = &[
    ("国家发展改革委", "国家发展和改革委员会"),
    ("国家发改委", "国家发展和改革委员会"),
    ("发改委", "国家发展和改革委员会"),
    ("财政部机关司局", "财政部"),
    ("财政厅", "财政部"),
    ("中国人民银行", "中国人民银行"),
    ("央行", "中国人民银行"),
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static DEPT_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(部门单位|部门)\s*[:：]").unwrap());
static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[（(].*?[）)]").unwrap());
static CLAUSE_CANONICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第[一二三四五六七八九十百千万零0-9]+条").unwrap());

/// Entity name normalization applied before node-identity hashing.
pub struct EntityLinker;

impl EntityLinker {
    /// Canonical form of an entity name, or `None` when nothing
    /// survives normalization.
    pub fn normalize(node_type: NodeType, value: &str) -> Option<String> {
        let text = Self::normalize_whitespace(value);
        if text.is_empty() {
            return None;
        }

        let text = match node_type {
            NodeType::Department => Self::normalize_department(&text),
            NodeType::Clause => Self::normalize_clause(&text),
            NodeType::Issue | NodeType::RectificationAction | NodeType::Section => {
                Self::cap(&text, 120)
            }
            _ => text,
        };

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn normalize_whitespace(text: &str) -> String {
        let text = text.replace('\u{3000}', " ");
        let collapsed = WHITESPACE.replace_all(&text, " ");
        collapsed
            .trim()
            .trim_matches(|c: char| "，。；;:：,./\\|[]()（）".contains(c))
            .to_string()
    }

    fn normalize_department(text: &str) -> String {
        let text = DEPT_LABEL.replace(text, "");
        let text = PARENTHETICAL.replace_all(text.trim(), "");
        let text = text.trim();

        for &(alias, canonical) in DEPARTMENT_ALIAS {
            if text == alias {
                return canonical.to_string();
            }
        }
        for &(alias, canonical) in DEPARTMENT_ALIAS {
            if text.contains(alias) {
                return canonical.to_string();
            }
        }

        Self::cap(text, 60)
    }

    fn normalize_clause(text: &str) -> String {
        match CLAUSE_CANONICAL.find(text) {
            Some(m) => m.as_str().to_string(),
            None => Self::cap(text, 40),
        }
    }

    fn cap(text: &str, max_chars: usize) -> String {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_and_punctuation_trimmed() {
        let name = EntityLinker::normalize(NodeType::Topic, "\u{3000}采购  管理，").unwrap();
        assert_eq!(name, "采购 管理");
        assert!(EntityLinker::normalize(NodeType::Topic, " ，。 ").is_none());
    }

    #[test]
    fn test_department_alias_exact() {
        assert_eq!(
            EntityLinker::normalize(NodeType::Department, "财政厅").unwrap(),
            "财政部"
        );
        assert_eq!(
            EntityLinker::normalize(NodeType::Department, "发改委").unwrap(),
            "国家发展和改革委员会"
        );
    }

    #[test]
    fn test_department_alias_substring() {
        assert_eq!(
            EntityLinker::normalize(NodeType::Department, "省发改委办公室").unwrap(),
            "国家发展和改革委员会"
        );
        assert_eq!(
            EntityLinker::normalize(NodeType::Department, "央行营业管理部").unwrap(),
            "中国人民银行"
        );
    }

    #[test]
    fn test_department_label_and_parens_stripped() {
        assert_eq!(
            EntityLinker::normalize(NodeType::Department, "部门单位：财政部（本级）").unwrap(),
            "财政部"
        );
    }

    #[test]
    fn test_non_aliased_department_passes_through() {
        assert_eq!(
            EntityLinker::normalize(NodeType::Department, "教育部").unwrap(),
            "教育部"
        );
    }

    #[test]
    fn test_clause_canonical_form() {
        assert_eq!(
            EntityLinker::normalize(NodeType::Clause, "依据第十三条的规定").unwrap(),
            "第十三条"
        );
        // Chapter markers carry no 条, so the text is kept as-is.
        assert_eq!(
            EntityLinker::normalize(NodeType::Clause, "第一章").unwrap(),
            "第一章"
        );
    }

    #[test]
    fn test_issue_capped_at_120_chars() {
        let long = "问".repeat(200);
        let name = EntityLinker::normalize(NodeType::Issue, &long).unwrap();
        assert_eq!(name.chars().count(), 120);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for (node_type, raw) in [
            (NodeType::Department, "部门单位：财政厅（本级）"),
            (NodeType::Clause, "依据第十三条的规定"),
            (NodeType::Topic, "\u{3000}资金管理 "),
        ] {
            let once = EntityLinker::normalize(node_type, raw).unwrap();
            let twice = EntityLinker::normalize(node_type, &once).unwrap();
            assert_eq!(once, twice);
        }
    }
}
