//! Knowledge graph ontology: node types, relations, evidence.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Maximum merged edge weight. Duplicate `(source, target, relation)`
/// observations sum weights up to this cap.
pub const EDGE_WEIGHT_CAP: f32 = 5.0;

/// Node categories in the audit domain graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Document,
    Chunk,
    Clause,
    Department,
    RiskType,
    Issue,
    RectificationAction,
    RectificationStatus,
    Year,
    Section,
    Topic,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Chunk => "chunk",
            Self::Clause => "clause",
            Self::Department => "department",
            Self::RiskType => "risk_type",
            Self::Issue => "issue",
            Self::RectificationAction => "rectification_action",
            Self::RectificationStatus => "rectification_status",
            Self::Year => "year",
            Self::Section => "section",
            Self::Topic => "topic",
        }
    }

    /// Display label used by the browsing endpoints.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Document => "文档",
            Self::Chunk => "文本块",
            Self::Clause => "条款",
            Self::Department => "部门",
            Self::RiskType => "风险类型",
            Self::Issue => "审计问题",
            Self::RectificationAction => "整改措施",
            Self::RectificationStatus => "整改状态",
            Self::Year => "年度",
            Self::Section => "章节",
            Self::Topic => "主题",
        }
    }

    /// Structural nodes mirror the registry (documents and chunks); all
    /// other nodes are extracted entities and must carry evidence.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Document | Self::Chunk)
    }
}

/// Typed relations with per-relation traversal weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Contains,
    PartOf,
    Mentions,
    MentionedBy,
    BelongsToDepartment,
    HasIssue,
    HasAction,
    ActionOf,
    HasStatus,
    StatusOf,
    OccursInYear,
    YearOf,
    HasRiskType,
    RiskTypeOf,
    ViolatesClause,
    ViolatedBy,
    RelatedClause,
    ClauseRelatedBy,
    HasTopic,
    TopicOf,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::PartOf => "part_of",
            Self::Mentions => "mentions",
            Self::MentionedBy => "mentioned_by",
            Self::BelongsToDepartment => "belongs_to_department",
            Self::HasIssue => "has_issue",
            Self::HasAction => "has_action",
            Self::ActionOf => "action_of",
            Self::HasStatus => "has_status",
            Self::StatusOf => "status_of",
            Self::OccursInYear => "occurs_in_year",
            Self::YearOf => "year_of",
            Self::HasRiskType => "has_risk_type",
            Self::RiskTypeOf => "risk_type_of",
            Self::ViolatesClause => "violates_clause",
            Self::ViolatedBy => "violated_by",
            Self::RelatedClause => "related_clause",
            Self::ClauseRelatedBy => "clause_related_by",
            Self::HasTopic => "has_topic",
            Self::TopicOf => "topic_of",
        }
    }

    /// Reverse relation used for bidirectional edges.
    pub fn reverse(&self) -> Relation {
        match self {
            Self::Contains => Self::PartOf,
            Self::PartOf => Self::Contains,
            Self::Mentions => Self::MentionedBy,
            Self::MentionedBy => Self::Mentions,
            Self::BelongsToDepartment => Self::HasIssue,
            Self::HasIssue => Self::BelongsToDepartment,
            Self::HasAction => Self::ActionOf,
            Self::ActionOf => Self::HasAction,
            Self::HasStatus => Self::StatusOf,
            Self::StatusOf => Self::HasStatus,
            Self::OccursInYear => Self::YearOf,
            Self::YearOf => Self::OccursInYear,
            Self::HasRiskType => Self::RiskTypeOf,
            Self::RiskTypeOf => Self::HasRiskType,
            Self::ViolatesClause => Self::ViolatedBy,
            Self::ViolatedBy => Self::ViolatesClause,
            Self::RelatedClause => Self::ClauseRelatedBy,
            Self::ClauseRelatedBy => Self::RelatedClause,
            Self::HasTopic => Self::TopicOf,
            Self::TopicOf => Self::HasTopic,
        }
    }

    /// Traversal weight used by the graph retriever's path scoring.
    pub fn traversal_weight(&self) -> f32 {
        match self {
            Self::Contains | Self::PartOf => 0.70,
            Self::Mentions | Self::MentionedBy => 0.90,
            Self::BelongsToDepartment | Self::HasIssue => 1.15,
            Self::HasAction | Self::ActionOf => 1.20,
            Self::HasStatus | Self::StatusOf => 1.00,
            Self::OccursInYear | Self::YearOf => 0.95,
            Self::HasRiskType | Self::RiskTypeOf => 1.10,
            Self::ViolatesClause | Self::ViolatedBy => 1.25,
            Self::RelatedClause | Self::ClauseRelatedBy => 1.12,
            Self::HasTopic | Self::TopicOf => 1.05,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link from a node or edge back to the chunk that justified it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub doc_id: String,
    pub chunk_id: String,
    pub extractor: String,
    pub confidence: f32,
}

impl Evidence {
    pub fn new(
        doc_id: impl Into<String>,
        chunk_id: impl Into<String>,
        extractor: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id: chunk_id.into(),
            extractor: extractor.into(),
            confidence,
        }
    }

    /// Dedup key: one entry per (doc, chunk, extractor).
    pub fn key(&self) -> (String, String, String) {
        (
            self.doc_id.clone(),
            self.chunk_id.clone(),
            self.extractor.clone(),
        )
    }
}

/// Graph node: typed, named, with type-specific attributes and evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: name.into(),
            attrs: BTreeMap::new(),
            evidence: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }
}

/// Directed edge stored in a node's adjacency list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub target: String,
    pub relation: Relation,
    pub weight: f32,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl GraphEdge {
    pub fn evidence_count(&self) -> usize {
        self.evidence.len()
    }
}

/// Stable node id for an extracted entity: `{type}:{16-hex digest}`.
pub fn entity_node_id(node_type: NodeType, canonical_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(node_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(canonical_name.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}:{}", node_type.as_str(), &digest[..16])
}

/// Node id for a document row.
pub fn document_node_id(doc_id: &str) -> String {
    format!("document:{doc_id}")
}

/// Node id for a chunk.
pub fn chunk_node_id(chunk_id: &str) -> String {
    format!("chunk:{chunk_id}")
}
