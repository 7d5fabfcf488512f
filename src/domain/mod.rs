//! Domain layer - Core business logic and entities

pub mod answer;
pub mod document;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod ingestion;
pub mod llm;
pub mod rerank;
pub mod retrieval;
pub mod session;

pub use answer::{
    build_citation, build_source_contexts, AskEvent, CancelHandle, Citation, ProgressStage,
    ProgressStatus, SourceContext,
};
pub use document::{
    canonicalize_content, content_hash, doc_id_from_hash, DocStatus, DocType, DocumentRecord,
};
pub use embedding::{embed_in_batches, EmbeddingProvider};
pub use error::DomainError;
pub use graph::{
    chunk_node_id, document_node_id, entity_node_id, Evidence, GraphEdge, GraphNode, NodeType,
    Relation, EDGE_WEIGHT_CAP,
};
pub use ingestion::{
    detect_format, Block, BlockKind, ChunkPiece, ChunkRecord, ChunkerMode, ChunkerOptions,
    ChunkingStrategy, DocumentFormat, DocumentParser, IngestOptions, ParsedDocument,
    SemanticBoundary,
};
pub use llm::{
    ChatRole, LlmProvider, LlmRequest, LlmResponse, LlmStream, LlmUsage, Message, StreamChunk,
};
pub use rerank::{RankedItem, RerankProvider};
pub use retrieval::{
    Intent, IntentRoute, RetrievalMode, RetrievalOptions, RetrievalOverrides, SearchHit,
    DEFAULT_HYBRID_ALPHA, DEFAULT_TOP_K,
};
pub use session::{SessionLimits, SessionMessage};
