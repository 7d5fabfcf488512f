//! Rule-based entity and relation extractors
//!
//! The builder runs the fixed pipeline clause → department → issue →
//! rectification → topic over every chunk. Each extractor decides its
//! own applicability from the chunk's doc type.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Debug;

use crate::domain::document::DocType;
use crate::domain::graph::{NodeType, Relation};
use crate::domain::ingestion::ChunkRecord;

use super::entity_linker::EntityLinker;

/// An extracted entity occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub node_type: NodeType,
    pub name: String,
    pub confidence: f32,
    /// Type-specific attributes attached to the node on first sight.
    pub attrs: Vec<(String, serde_json::Value)>,
}

impl EntityRecord {
    pub fn new(node_type: NodeType, name: impl Into<String>, confidence: f32) -> Self {
        Self {
            node_type,
            name: name.into(),
            confidence,
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.push((key.into(), value));
        self
    }
}

/// An extracted typed relation between two entities.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRecord {
    pub source: (NodeType, String),
    pub relation: Relation,
    pub target: (NodeType, String),
    pub weight: f32,
    pub confidence: f32,
}

impl RelationRecord {
    pub fn new(
        source: (NodeType, String),
        relation: Relation,
        target: (NodeType, String),
        weight: f32,
        confidence: f32,
    ) -> Self {
        Self {
            source,
            relation,
            target,
            weight,
            confidence,
        }
    }
}

/// One step of the extraction pipeline.
pub trait EntityExtractor: Send + Sync + Debug {
    fn name(&self) -> &'static str;
    fn entities(&self, chunk: &ChunkRecord) -> Vec<EntityRecord>;
    fn relations(&self, chunk: &ChunkRecord) -> Vec<RelationRecord>;
}

/// The fixed extractor pipeline, in execution order.
pub fn extractor_pipeline() -> Vec<Box<dyn EntityExtractor>> {
    vec![
        Box::new(ClauseExtractor),
        Box::new(DepartmentExtractor),
        Box::new(IssueExtractor),
        Box::new(RectificationExtractor),
        Box::new(TopicExtractor),
    ]
}

// ---- shared patterns ----

static CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第[一二三四五六七八九十百千\d]+[章节条]").unwrap());

static DEPARTMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[一-龥]{2,10}(?:部|委员会|委|总局|局|厅|中心|大学|学院|院|银行|公司|集团|办公厅|办)")
        .unwrap()
});

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(20\d{2})\s*年").unwrap());

static AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(万元|亿元|元)").unwrap());

static ISSUE_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:问题摘要|问题描述)\s*[:：]\s*([^\n]{4,220})").unwrap());

static ISSUE_DEPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:部门单位|部门)\s*[:：]\s*([^\n]{2,80})").unwrap());

static ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:整改情况|整改措施|整改结果)\s*[:：]\s*([^\n]{4,240})").unwrap());

/// Status keyword → canonical status, checked in order.
const STATUS_RULES: [(&str, &str); 9] = [
    ("已整改", "completed"),
    ("整改完成", "completed"),
    ("完成整改", "completed"),
    ("持续整改", "in_progress"),
    ("正在整改", "in_progress"),
    ("整改中", "in_progress"),
    ("尚未整改", "pending"),
    ("未整改", "pending"),
    ("待整改", "pending"),
];

const TOPIC_RULES: [(&str, &str); 8] = [
    ("采购", "采购管理"),
    ("预算", "预算执行"),
    ("资金", "资金管理"),
    ("数据", "数据治理"),
    ("网络", "网络安全"),
    ("内控", "内部控制"),
    ("个人信息", "个人信息保护"),
    ("项目", "项目管理"),
];

const RISK_RULES: [(&str, &str); 6] = [
    ("违规", "合规风险"),
    ("舞弊", "舞弊风险"),
    ("超预算", "财务风险"),
    ("挪用", "资金风险"),
    ("泄露", "信息安全风险"),
    ("损失", "财务风险"),
];

fn clauses_in(text: &str, limit: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for m in CLAUSE.find_iter(text) {
        let value = m.as_str().to_string();
        if !seen.contains(&value) {
            seen.push(value);
            if seen.len() >= limit {
                break;
            }
        }
    }
    seen
}

fn issue_summary(chunk: &ChunkRecord) -> Option<String> {
    if let Some(captures) = ISSUE_SUMMARY.captures(&chunk.text) {
        return Some(captures[1].trim().chars().take(160).collect());
    }
    // Fallback: the first line that reads like a problem statement.
    chunk
        .text
        .lines()
        .map(str::trim)
        .find(|line| {
            line.chars().count() >= 12
                && (line.contains("问题") || line.contains("违规") || line.contains("整改"))
        })
        .map(|line| line.chars().take(160).collect())
}

fn issue_status(text: &str) -> Option<&'static str> {
    let sample: String = text.chars().take(1500).collect();
    STATUS_RULES
        .iter()
        .find(|(keyword, _)| sample.contains(keyword))
        .map(|&(_, status)| status)
}

// ---- clause extractor ----

/// Clause references (第X章/节/条). The builder links clause nodes back
/// to their document.
#[derive(Debug)]
pub struct ClauseExtractor;

impl EntityExtractor for ClauseExtractor {
    fn name(&self) -> &'static str {
        "clause"
    }

    fn entities(&self, chunk: &ChunkRecord) -> Vec<EntityRecord> {
        clauses_in(&chunk.text, 8)
            .into_iter()
            .map(|clause| EntityRecord::new(NodeType::Clause, clause, 0.9))
            .collect()
    }

    fn relations(&self, chunk: &ChunkRecord) -> Vec<RelationRecord> {
        if !chunk.doc_type.is_regulation() {
            return Vec::new();
        }
        // Clauses co-occurring with risk keywords address those risks.
        let mut relations = Vec::new();
        for clause in clauses_in(&chunk.text, 8) {
            for (keyword, risk) in RISK_RULES {
                if chunk.text.contains(keyword) {
                    relations.push(RelationRecord::new(
                        (NodeType::Clause, clause.clone()),
                        Relation::HasRiskType,
                        (NodeType::RiskType, risk.to_string()),
                        1.05,
                        0.72,
                    ));
                }
            }
        }
        relations
    }
}

// ---- department extractor ----

/// Organisational units, plus department↔issue links in issue chunks.
#[derive(Debug)]
pub struct DepartmentExtractor;

impl DepartmentExtractor {
    /// Department names, alias-canonicalised so spelling variants of
    /// one unit collapse before deduplication.
    fn departments_in(chunk: &ChunkRecord) -> Vec<String> {
        let mut found = Vec::new();
        if chunk.doc_type == DocType::AuditIssue {
            for captures in ISSUE_DEPT.captures_iter(&chunk.text) {
                let Some(value) = EntityLinker::normalize(NodeType::Department, &captures[1])
                else {
                    continue;
                };
                if !found.contains(&value) {
                    found.push(value);
                }
            }
        }
        if found.is_empty() {
            let sample: String = chunk.text.chars().take(2000).collect();
            for m in DEPARTMENT.find_iter(&sample) {
                let Some(value) = EntityLinker::normalize(NodeType::Department, m.as_str())
                else {
                    continue;
                };
                if !found.contains(&value) {
                    found.push(value);
                    if found.len() >= 5 {
                        break;
                    }
                }
            }
        }
        found
    }
}

impl EntityExtractor for DepartmentExtractor {
    fn name(&self) -> &'static str {
        "department"
    }

    fn entities(&self, chunk: &ChunkRecord) -> Vec<EntityRecord> {
        if chunk.doc_type.is_regulation() {
            return Vec::new();
        }
        Self::departments_in(chunk)
            .into_iter()
            .map(|d| EntityRecord::new(NodeType::Department, d, 0.85))
            .collect()
    }

    fn relations(&self, chunk: &ChunkRecord) -> Vec<RelationRecord> {
        if chunk.doc_type != DocType::AuditIssue {
            return Vec::new();
        }
        let Some(issue) = issue_summary(chunk) else {
            return Vec::new();
        };
        Self::departments_in(chunk)
            .into_iter()
            .map(|dept| {
                RelationRecord::new(
                    (NodeType::Issue, issue.clone()),
                    Relation::BelongsToDepartment,
                    (NodeType::Department, dept),
                    1.2,
                    0.95,
                )
            })
            .collect()
    }
}

// ---- issue extractor ----

/// Audit-issue rows become issue nodes with {summary, year, amount?}.
#[derive(Debug)]
pub struct IssueExtractor;

impl EntityExtractor for IssueExtractor {
    fn name(&self) -> &'static str {
        "issue"
    }

    fn entities(&self, chunk: &ChunkRecord) -> Vec<EntityRecord> {
        if chunk.doc_type != DocType::AuditIssue {
            return Vec::new();
        }
        let Some(summary) = issue_summary(chunk) else {
            return Vec::new();
        };

        let mut entity = EntityRecord::new(NodeType::Issue, summary.clone(), 0.92)
            .with_attr("summary", serde_json::json!(summary));
        if let Some(captures) = YEAR.captures(&chunk.text) {
            entity = entity.with_attr("year", serde_json::json!(captures[1].to_string()));
        }
        if let Some(captures) = AMOUNT.captures(&chunk.text) {
            entity = entity.with_attr(
                "amount",
                serde_json::json!(format!("{}{}", &captures[1], &captures[2])),
            );
        }

        let mut entities = vec![entity];
        for captures in YEAR.captures_iter(&chunk.text).take(2) {
            entities.push(EntityRecord::new(
                NodeType::Year,
                captures[1].to_string(),
                0.8,
            ));
        }
        for (keyword, risk) in RISK_RULES {
            if chunk.text.contains(keyword) {
                entities.push(EntityRecord::new(NodeType::RiskType, risk, 0.78));
            }
        }
        entities
    }

    fn relations(&self, chunk: &ChunkRecord) -> Vec<RelationRecord> {
        if chunk.doc_type != DocType::AuditIssue {
            return Vec::new();
        }
        let Some(issue) = issue_summary(chunk) else {
            return Vec::new();
        };

        let mut relations = Vec::new();
        for captures in YEAR.captures_iter(&chunk.text).take(2) {
            relations.push(RelationRecord::new(
                (NodeType::Issue, issue.clone()),
                Relation::OccursInYear,
                (NodeType::Year, captures[1].to_string()),
                0.95,
                0.8,
            ));
        }
        for (keyword, risk) in RISK_RULES {
            if chunk.text.contains(keyword) {
                relations.push(RelationRecord::new(
                    (NodeType::Issue, issue.clone()),
                    Relation::HasRiskType,
                    (NodeType::RiskType, risk.to_string()),
                    1.1,
                    0.78,
                ));
            }
        }
        for clause in clauses_in(&chunk.text, 4) {
            relations.push(RelationRecord::new(
                (NodeType::Issue, issue.clone()),
                Relation::ViolatesClause,
                (NodeType::Clause, clause),
                1.25,
                0.86,
            ));
        }
        relations
    }
}

// ---- rectification extractor ----

/// Rectification actions and status keywords, linked to the issue via
/// `has_action` / `has_status`.
#[derive(Debug)]
pub struct RectificationExtractor;

impl RectificationExtractor {
    fn action_in(chunk: &ChunkRecord) -> Option<String> {
        ACTION
            .captures(&chunk.text)
            .map(|c| c[1].trim().chars().take(160).collect())
    }
}

impl EntityExtractor for RectificationExtractor {
    fn name(&self) -> &'static str {
        "rectification"
    }

    fn entities(&self, chunk: &ChunkRecord) -> Vec<EntityRecord> {
        if chunk.doc_type != DocType::AuditIssue {
            return Vec::new();
        }
        let mut entities = Vec::new();
        if let Some(action) = Self::action_in(chunk) {
            entities.push(EntityRecord::new(NodeType::RectificationAction, action, 0.9));
        }
        if let Some(status) = issue_status(&chunk.text) {
            entities.push(EntityRecord::new(NodeType::RectificationStatus, status, 0.88));
        }
        entities
    }

    fn relations(&self, chunk: &ChunkRecord) -> Vec<RelationRecord> {
        if chunk.doc_type != DocType::AuditIssue {
            return Vec::new();
        }
        let Some(issue) = issue_summary(chunk) else {
            return Vec::new();
        };

        let mut relations = Vec::new();
        if let Some(action) = Self::action_in(chunk) {
            relations.push(RelationRecord::new(
                (NodeType::Issue, issue.clone()),
                Relation::HasAction,
                (NodeType::RectificationAction, action.clone()),
                1.2,
                0.9,
            ));
            if let Some(status) = issue_status(&chunk.text) {
                relations.push(RelationRecord::new(
                    (NodeType::RectificationAction, action),
                    Relation::HasStatus,
                    (NodeType::RectificationStatus, status.to_string()),
                    1.0,
                    0.88,
                ));
            }
        }
        relations
    }
}

// ---- topic extractor ----

/// Keyphrase topics from headings and section paths.
#[derive(Debug)]
pub struct TopicExtractor;

impl EntityExtractor for TopicExtractor {
    fn name(&self) -> &'static str {
        "topic"
    }

    fn entities(&self, chunk: &ChunkRecord) -> Vec<EntityRecord> {
        let mut haystack = chunk.header.clone();
        for section in &chunk.section_path {
            haystack.push('\n');
            haystack.push_str(section);
        }

        let mut topics = Vec::new();
        for (keyword, topic) in TOPIC_RULES {
            if haystack.contains(keyword)
                && !topics
                    .iter()
                    .any(|e: &EntityRecord| e.name == topic)
            {
                topics.push(EntityRecord::new(NodeType::Topic, topic, 0.75));
            }
        }
        topics
    }

    fn relations(&self, _chunk: &ChunkRecord) -> Vec<RelationRecord> {
        Vec::new()
    }
}
