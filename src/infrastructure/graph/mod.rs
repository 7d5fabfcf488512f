//! Knowledge graph: store, rule-based extraction, bounded-hop retrieval

pub mod builder;
pub mod entity_linker;
pub mod extractors;
pub mod retriever;
pub mod store;

pub use builder::GraphBuilder;
pub use entity_linker::EntityLinker;
pub use retriever::{GraphHit, GraphRetriever};
pub use store::{GraphStats, GraphStore};
