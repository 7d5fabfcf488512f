//! Retrieval routing types: intents, modes, options, plans, hits.

use serde::{Deserialize, Serialize};

use crate::domain::document::DocType;
use crate::domain::ingestion::ChunkRecord;
use crate::domain::DomainError;

/// Fusion weight blending normalised vector and graph scores.
pub const DEFAULT_HYBRID_ALPHA: f32 = 0.65;
pub const DEFAULT_TOP_K: usize = 5;
/// Analytical queries widen recall.
pub const ANALYTICAL_TOP_K: usize = 20;
pub const DEFAULT_GRAPH_TOP_K: usize = 12;
pub const DEFAULT_GRAPH_HOPS: u8 = 2;
pub const DEFAULT_RERANK_TOP_K: usize = 10;

/// Query intent classes emitted by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    RegulationQuery,
    AuditQuery,
    IssueQuery,
    AnalysisQuery,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegulationQuery => "regulation_query",
            Self::AuditQuery => "audit_query",
            Self::IssueQuery => "issue_query",
            Self::AnalysisQuery => "analysis_query",
            Self::General => "general",
        }
    }

    /// Doc-type filter implied by the intent. `None` means unrestricted.
    pub fn doc_type_filter(&self) -> Option<Vec<DocType>> {
        match self {
            Self::RegulationQuery => Some(vec![
                DocType::InternalRegulation,
                DocType::ExternalRegulation,
            ]),
            Self::AuditQuery | Self::IssueQuery | Self::AnalysisQuery => Some(vec![
                DocType::InternalReport,
                DocType::ExternalReport,
                DocType::AuditIssue,
            ]),
            Self::General => None,
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regulation_query" => Ok(Self::RegulationQuery),
            "audit_query" => Ok(Self::AuditQuery),
            "issue_query" => Ok(Self::IssueQuery),
            "analysis_query" => Ok(Self::AnalysisQuery),
            "general" => Ok(Self::General),
            other => Err(DomainError::bad_request(format!("unknown intent: {other}"))),
        }
    }
}

/// Which index families serve a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Vector,
    Graph,
    Hybrid,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn uses_vector(&self) -> bool {
        matches!(self, Self::Vector | Self::Hybrid)
    }

    pub fn uses_graph(&self) -> bool {
        matches!(self, Self::Graph | Self::Hybrid)
    }
}

impl std::str::FromStr for RetrievalMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" => Ok(Self::Vector),
            "graph" => Ok(Self::Graph),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(DomainError::bad_request(format!(
                "unknown retrieval_mode: {other}"
            ))),
        }
    }
}

/// Fully-resolved options for one retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOptions {
    pub mode: RetrievalMode,
    pub top_k: usize,
    pub rerank_top_k: usize,
    pub use_rerank: bool,
    pub doc_types: Option<Vec<DocType>>,
    pub title_filter: Option<String>,
    pub graph_top_k: usize,
    /// Bounded-hop budget for graph expansion, clamped to 1..=3.
    pub hops: u8,
    pub alpha: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Hybrid,
            top_k: DEFAULT_TOP_K,
            rerank_top_k: DEFAULT_RERANK_TOP_K,
            use_rerank: true,
            doc_types: None,
            title_filter: None,
            graph_top_k: DEFAULT_GRAPH_TOP_K,
            hops: DEFAULT_GRAPH_HOPS,
            alpha: DEFAULT_HYBRID_ALPHA,
        }
    }
}

impl RetrievalOptions {
    /// Clamp every field into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.top_k = self.top_k.clamp(1, 50);
        self.rerank_top_k = self.rerank_top_k.clamp(1, 50);
        self.graph_top_k = self.graph_top_k.clamp(1, 40);
        self.hops = self.hops.clamp(1, 3);
        self.alpha = self.alpha.clamp(0.0, 1.0);
        self
    }
}

/// Caller overrides accepted by the query endpoints; unset fields fall
/// back to the routed plan.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievalOverrides {
    pub retrieval_mode: Option<RetrievalMode>,
    pub top_k: Option<usize>,
    pub graph_hops: Option<u8>,
    pub hybrid_alpha: Option<f32>,
    pub use_rerank: Option<bool>,
    pub doc_types: Option<Vec<DocType>>,
}

/// Routed parameters for a classified query.
#[derive(Debug, Clone, Serialize)]
pub struct IntentRoute {
    pub intent: Intent,
    pub reason: String,
    pub options: RetrievalOptions,
}

/// One retrieval result with its score breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_score: Option<f32>,
    /// Fused score before reranking replaced it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_score: Option<f32>,
}

impl SearchHit {
    pub fn vector(chunk: ChunkRecord, score: f32) -> Self {
        Self {
            chunk,
            score,
            vector_score: Some(score),
            graph_score: None,
            original_score: None,
        }
    }

    pub fn graph(chunk: ChunkRecord, score: f32) -> Self {
        Self {
            chunk,
            score,
            vector_score: None,
            graph_score: Some(score),
            original_score: None,
        }
    }
}
