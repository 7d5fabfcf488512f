//! Ingest orchestration: parse → chunk → dedup → embed → commit

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::document::{content_hash, doc_id_from_hash, DocType};
use crate::domain::embedding::{embed_in_batches, EmbeddingProvider};
use crate::domain::ingestion::{ChunkRecord, ChunkerOptions, IngestOptions};
use crate::domain::DomainError;
use crate::infrastructure::chunkers::strategy_for;
use crate::infrastructure::graph::GraphBuilder;
use crate::infrastructure::parsers::parser_for;
use crate::infrastructure::registry::{new_record, DocumentQuery, IngestDecision, RegistryStats};

use super::StoreSet;

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct IngestFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Per-file result, reported in submission order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    New {
        filename: String,
        doc_id: String,
        chunks: usize,
    },
    Skipped {
        filename: String,
        doc_id: String,
    },
    Updated {
        filename: String,
        doc_id: String,
        version: u32,
        chunks: usize,
    },
    Failed {
        filename: String,
        kind: String,
        message: String,
    },
}

/// Aggregated batch response. The batch never fails wholesale on one
/// file's error.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub skipped: usize,
    pub updated: usize,
    pub failed: usize,
    pub total_chunks: usize,
    pub chunker_used: String,
    pub results: Vec<FileOutcome>,
}

/// Drives the ingest flow for uploaded files.
pub struct IngestionService {
    stores: Arc<StoreSet>,
    embedder: Arc<dyn EmbeddingProvider>,
    builder: GraphBuilder,
    chunk_size: usize,
    overlap: usize,
    concurrency: usize,
    /// Total budget for all embedding calls of one file, retries
    /// included.
    embed_budget: Duration,
}

impl IngestionService {
    pub fn new(
        stores: Arc<StoreSet>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunk_size: usize,
        overlap: usize,
        concurrency: usize,
        embed_budget: Duration,
    ) -> Self {
        Self {
            stores,
            embedder,
            builder: GraphBuilder::new(),
            chunk_size,
            overlap,
            concurrency: concurrency.max(1),
            embed_budget,
        }
    }

    /// Process a batch of uploads. Units run with a bounded concurrency
    /// cap; outcomes are reported in submission order.
    pub async fn ingest(&self, files: Vec<IngestFile>, options: IngestOptions) -> IngestReport {
        let chunker_used = options.chunker.as_str().to_string();

        let results: Vec<FileOutcome> = stream::iter(files)
            .map(|file| {
                let options = options.clone();
                async move {
                    let filename = file.filename.clone();
                    match self.ingest_one(file, &options).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(filename = %filename, error = %e, "ingest unit failed");
                            FileOutcome::Failed {
                                filename,
                                kind: e.kind().to_string(),
                                message: e.to_string(),
                            }
                        }
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        if options.save_after {
            if let Err(e) = self.stores.persist_all().await {
                warn!(error = %e, "persisting stores after ingest failed");
            }
        }

        let mut report = IngestReport {
            processed: 0,
            skipped: 0,
            updated: 0,
            failed: 0,
            total_chunks: 0,
            chunker_used,
            results,
        };
        for outcome in &report.results {
            match outcome {
                FileOutcome::New { .. } => report.processed += 1,
                FileOutcome::Skipped { .. } => report.skipped += 1,
                FileOutcome::Updated { .. } => report.updated += 1,
                FileOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report.total_chunks = self.stores.registry.read().await.stats().total_chunks;
        report
    }

    /// One unit of work: parse → chunk → dedup → embed → commit.
    async fn ingest_one(
        &self,
        file: IngestFile,
        options: &IngestOptions,
    ) -> Result<FileOutcome, DomainError> {
        let filename = file.filename.clone();

        let parser = parser_for(&filename)?;
        let parsed = parser.parse(&file.bytes, &filename)?;
        if parsed.is_empty() {
            return Err(DomainError::parse(format!("{filename}: empty document")));
        }

        let full_text = parsed.full_text();
        let hash = content_hash(&full_text);
        let doc_id = doc_id_from_hash(&hash);

        // Cheap pre-check so duplicates skip chunking and embedding.
        if let IngestDecision::Duplicate { doc_id } = self
            .stores
            .registry
            .read()
            .await
            .ingest_decision(&hash, &filename)
        {
            info!(filename = %filename, doc_id = %doc_id, "duplicate upload skipped");
            return Ok(FileOutcome::Skipped { filename, doc_id });
        }

        let chunker_options = ChunkerOptions {
            mode: options.chunker,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
        };
        let strategy = strategy_for(options.chunker, &parsed);
        let pieces = strategy.chunk(&parsed, &chunker_options)?;
        if pieces.is_empty() {
            return Err(DomainError::chunk(format!(
                "{filename}: document produced no chunks"
            )));
        }

        let title = options.title.clone().unwrap_or_else(|| filename.clone());
        let chunks: Vec<ChunkRecord> = pieces
            .into_iter()
            .enumerate()
            .map(|(ordinal, piece)| {
                ChunkRecord::from_piece(piece, ordinal, &doc_id, options.doc_type, &title, &filename)
            })
            .collect();

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = tokio::time::timeout(
            self.embed_budget,
            embed_in_batches(self.embedder.as_ref(), &texts),
        )
        .await
        .map_err(|_| {
            DomainError::provider_timeout(format!("{filename}: embedding budget exceeded"))
        })??;

        self.commit(
            &filename,
            &hash,
            &doc_id,
            &title,
            options.doc_type,
            full_text.len() as u64,
            chunks,
            embeddings,
        )
        .await
    }

    /// Commit under the write lane. Partial index writes are reversed
    /// in memory if a later step fails.
    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        filename: &str,
        hash: &str,
        doc_id: &str,
        title: &str,
        doc_type: DocType,
        file_size: u64,
        chunks: Vec<ChunkRecord>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<FileOutcome, DomainError> {
        let mut registry = self.stores.registry.write().await;
        let mut vectors = self.stores.vectors.write().await;
        let mut graph = self.stores.graph.write().await;

        // Decide again under the lock; a concurrent unit may have won.
        match registry.ingest_decision(hash, filename) {
            IngestDecision::Duplicate { doc_id } => Ok(FileOutcome::Skipped {
                filename: filename.to_string(),
                doc_id,
            }),
            IngestDecision::New => {
                let chunk_count = chunks.len();
                vectors.add(embeddings, chunks.clone())?;
                let record = new_record(
                    doc_id, filename, title, doc_type, hash, file_size, 1, chunk_count,
                );
                if let Err(e) = registry.insert_new(record) {
                    vectors.delete_by_doc(doc_id);
                    return Err(e);
                }
                for chunk in &chunks {
                    self.builder.extend(&mut graph, chunk);
                }
                info!(filename, doc_id, chunks = chunk_count, "document ingested");
                Ok(FileOutcome::New {
                    filename: filename.to_string(),
                    doc_id: doc_id.to_string(),
                    chunks: chunk_count,
                })
            }
            IngestDecision::Update {
                old_doc_id,
                next_version,
            } => {
                let chunk_count = chunks.len();
                let removed = vectors.delete_by_doc(&old_doc_id);
                if let Err(e) = vectors.add(embeddings, chunks.clone()) {
                    vectors.restore(removed);
                    return Err(e);
                }
                let record = new_record(
                    doc_id,
                    filename,
                    title,
                    doc_type,
                    hash,
                    file_size,
                    next_version,
                    chunk_count,
                );
                if let Err(e) = registry.replace_for_update(&old_doc_id, record) {
                    vectors.delete_by_doc(doc_id);
                    vectors.restore(removed);
                    return Err(e);
                }
                graph.remove_doc(&old_doc_id);
                for chunk in &chunks {
                    self.builder.extend(&mut graph, chunk);
                }
                info!(
                    filename,
                    doc_id,
                    version = next_version,
                    chunks = chunk_count,
                    "document updated"
                );
                Ok(FileOutcome::Updated {
                    filename: filename.to_string(),
                    doc_id: doc_id.to_string(),
                    version: next_version,
                    chunks: chunk_count,
                })
            }
        }
    }

    /// Logical delete: mark the registry row, purge both indices.
    pub async fn delete_document(&self, doc_id: &str) -> Result<usize, DomainError> {
        let mut registry = self.stores.registry.write().await;
        let mut vectors = self.stores.vectors.write().await;
        let mut graph = self.stores.graph.write().await;

        registry.logical_delete(doc_id)?;
        let removed = vectors.delete_by_doc(doc_id).len();
        graph.remove_doc(doc_id);

        registry.save()?;
        vectors.save(&self.stores.paths.vector_base())?;
        graph.save(&self.stores.paths.graph())?;
        info!(doc_id, removed_chunks = removed, "document deleted");
        Ok(removed)
    }

    /// Drop everything: registry rows, both indices, persisted files.
    pub async fn clear_all(&self) -> Result<usize, DomainError> {
        let mut registry = self.stores.registry.write().await;
        let mut vectors = self.stores.vectors.write().await;
        let mut graph = self.stores.graph.write().await;

        let removed = registry.clear_all()?;
        let dimension = vectors.dimension();
        *vectors = crate::infrastructure::vector_store::VectorStore::new(dimension);
        graph.clear();

        for path in [
            self.stores.paths.vector_base().with_extension("index"),
            self.stores.paths.vector_base().with_extension("docs"),
            self.stores.paths.graph(),
        ] {
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| DomainError::registry(format!("remove {path:?}: {e}")))?;
            }
        }
        info!(removed_documents = removed, "all documents cleared");
        Ok(removed)
    }

    pub async fn list_documents(
        &self,
        query: &DocumentQuery,
    ) -> Vec<crate::domain::document::DocumentRecord> {
        self.stores.registry.read().await.list(query)
    }

    pub async fn get_document(
        &self,
        doc_id: &str,
    ) -> Option<crate::domain::document::DocumentRecord> {
        self.stores.registry.read().await.get(doc_id).cloned()
    }

    pub async fn get_document_chunks(
        &self,
        doc_id: &str,
    ) -> Result<Vec<ChunkRecord>, DomainError> {
        let registry = self.stores.registry.read().await;
        registry
            .get(doc_id)
            .ok_or_else(|| DomainError::not_found(format!("document {doc_id} not found")))?;
        drop(registry);
        let mut chunks = self.stores.vectors.read().await.chunks_for_doc(doc_id);
        chunks.sort_by_key(|c| c.ordinal);
        Ok(chunks)
    }

    pub async fn stats(&self) -> RegistryStats {
        self.stores.registry.read().await.stats()
    }

    /// Cross-check invariant: registry chunk counts equal vector-store
    /// counts for every active document, with no orphans either way.
    pub async fn verify_consistency(&self) -> Result<(), DomainError> {
        let registry = self.stores.registry.read().await;
        let vectors = self.stores.vectors.read().await;
        for record in registry.active_records() {
            let actual = vectors.count_for_doc(&record.doc_id);
            if actual != record.chunk_count {
                return Err(DomainError::registry(format!(
                    "document {}: registry says {} chunks, vector store has {}",
                    record.doc_id, record.chunk_count, actual
                )));
            }
        }
        let active: HashSet<&str> = registry.active_records().map(|d| d.doc_id.as_str()).collect();
        for chunk in vectors.iter_chunks() {
            if !active.contains(chunk.doc_id.as_str()) {
                return Err(DomainError::vector_store(format!(
                    "orphan vector entry for document {}",
                    chunk.doc_id
                )));
            }
        }
        Ok(())
    }
}
