//! Retrieval plumbing: score fusion, reranking, intent routing

pub mod hybrid;
pub mod intent_router;
pub mod reranker;

pub use hybrid::fuse_hybrid;
pub use intent_router::IntentRouter;
pub use reranker::apply_rerank;
