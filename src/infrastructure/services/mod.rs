//! Orchestrating services
//!
//! The orchestrator owns the registry and both indices. Mutations
//! serialise through one write lane per store (`tokio::sync::RwLock`);
//! reads proceed in parallel. Lock order everywhere is registry →
//! vectors → graph.

mod ask_service;
mod ingestion_service;

pub use ask_service::{AskAnswer, AskService, IntentSearchResult, SearchOutcome};
pub use ingestion_service::{FileOutcome, IngestFile, IngestReport, IngestionService};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::DomainError;
use crate::infrastructure::graph::{GraphBuilder, GraphStore};
use crate::infrastructure::registry::DocumentRegistry;
use crate::infrastructure::vector_store::VectorStore;

/// On-disk layout under the configured data root.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub data_root: PathBuf,
}

impl StorePaths {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn registry(&self) -> PathBuf {
        self.data_root.join("registry.json")
    }

    /// Base path for the `.index`/`.docs` pair.
    pub fn vector_base(&self) -> PathBuf {
        self.data_root.join("vector")
    }

    pub fn graph(&self) -> PathBuf {
        self.data_root.join("graph.bin")
    }
}

/// Registry plus both indices, each behind its own write lane.
#[derive(Debug)]
pub struct StoreSet {
    pub registry: RwLock<DocumentRegistry>,
    pub vectors: RwLock<VectorStore>,
    pub graph: RwLock<GraphStore>,
    pub paths: StorePaths,
}

impl StoreSet {
    /// Open the persisted stores, running the startup consistency
    /// check: orphans on either side of the registry↔vector pairing
    /// are dropped, and a missing graph file triggers a rebuild.
    pub fn open(data_root: &Path, dimension: usize) -> Result<Self, DomainError> {
        let paths = StorePaths::new(data_root);

        let mut registry = DocumentRegistry::load(paths.registry())?;
        let mut vectors = if VectorStore::exists(&paths.vector_base()) {
            VectorStore::load(&paths.vector_base())?
        } else {
            VectorStore::new(dimension)
        };

        let active_ids: HashSet<String> = registry
            .active_records()
            .map(|d| d.doc_id.clone())
            .collect();
        let dropped_vectors = vectors.reconcile(&active_ids);

        let counts = vectors.doc_chunk_counts();
        let dropped_rows = registry.reconcile(&counts);
        let adjusted = registry.sync_chunk_counts(&counts);
        if dropped_vectors > 0 || !dropped_rows.is_empty() || adjusted > 0 {
            warn!(
                dropped_vectors,
                dropped_rows = dropped_rows.len(),
                adjusted,
                "registry/vector reconciliation modified state"
            );
            registry.save()?;
            vectors.save(&paths.vector_base())?;
        }

        let graph = if paths.graph().exists() {
            match GraphStore::load(&paths.graph()) {
                Ok(graph) => graph,
                Err(e) => {
                    warn!(error = %e, "graph load failed, rebuilding");
                    Self::rebuild_graph_from(&vectors, &paths)?
                }
            }
        } else if vectors.is_empty() {
            GraphStore::new()
        } else {
            info!("graph file missing, rebuilding from vector store");
            Self::rebuild_graph_from(&vectors, &paths)?
        };

        Ok(Self {
            registry: RwLock::new(registry),
            vectors: RwLock::new(vectors),
            graph: RwLock::new(graph),
            paths,
        })
    }

    fn rebuild_graph_from(vectors: &VectorStore, paths: &StorePaths) -> Result<GraphStore, DomainError> {
        let graph = GraphBuilder::new().build(vectors.iter_chunks());
        graph.save(&paths.graph())?;
        Ok(graph)
    }

    /// Persist all three stores. Callers hold whatever locks the
    /// consistency of the snapshot requires.
    pub async fn persist_all(&self) -> Result<(), DomainError> {
        self.registry.read().await.save()?;
        self.vectors.read().await.save(&self.paths.vector_base())?;
        self.graph.read().await.save(&self.paths.graph())?;
        Ok(())
    }
}
