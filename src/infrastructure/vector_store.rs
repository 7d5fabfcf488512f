//! Flat cosine vector store with paired on-disk persistence
//!
//! Vectors live in a dense matrix with a parallel chunk-metadata list;
//! the two persist as a `.index` (bincode) / `.docs` (JSON) file pair
//! written via write-temp + atomic rename. Loading rejects a pair whose
//! lengths disagree.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::document::DocType;
use crate::domain::ingestion::ChunkRecord;
use crate::domain::DomainError;

/// AND-combined metadata filter for searches.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub doc_types: Option<Vec<DocType>>,
    pub doc_ids: Option<HashSet<String>>,
    pub title_substring: Option<String>,
}

impl SearchFilter {
    pub fn matches(&self, chunk: &ChunkRecord) -> bool {
        if let Some(ref doc_types) = self.doc_types {
            if !doc_types.contains(&chunk.doc_type) {
                return false;
            }
        }
        if let Some(ref doc_ids) = self.doc_ids {
            if !doc_ids.contains(&chunk.doc_id) {
                return false;
            }
        }
        if let Some(ref needle) = self.title_substring {
            if !chunk.title.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Dense float matrix + parallel chunk metadata.
#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<ChunkRecord>,
}

impl VectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn iter_chunks(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.chunks.iter()
    }

    fn normalize(vector: &mut [f32]) {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
    }

    /// Append embeddings with their chunk metadata; returns the
    /// assigned ordinal range.
    pub fn add(
        &mut self,
        embeddings: Vec<Vec<f32>>,
        chunks: Vec<ChunkRecord>,
    ) -> Result<Range<usize>, DomainError> {
        if embeddings.len() != chunks.len() {
            return Err(DomainError::vector_store(format!(
                "embedding count {} != chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }
        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(DomainError::vector_store(format!(
                    "embedding dimension {} != store dimension {}",
                    embedding.len(),
                    self.dimension
                )));
            }
        }

        let start = self.vectors.len();
        for mut embedding in embeddings {
            Self::normalize(&mut embedding);
            self.vectors.push(embedding);
        }
        self.chunks.extend(chunks);
        Ok(start..self.vectors.len())
    }

    /// Top-k cosine search with an AND metadata filter.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(ChunkRecord, f32)>, DomainError> {
        if query.len() != self.dimension {
            return Err(DomainError::vector_store(format!(
                "query dimension {} != store dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut normalized = query.to_vec();
        Self::normalize(&mut normalized);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| filter.matches(&self.chunks[*i]))
            .map(|(i, v)| {
                let score: f32 = v.iter().zip(normalized.iter()).map(|(a, b)| a * b).sum();
                (i, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.chunks[i].clone(), score))
            .collect())
    }

    pub fn get_by_chunk_id(&self, chunk_id: &str) -> Option<&ChunkRecord> {
        self.chunks.iter().find(|c| c.chunk_id == chunk_id)
    }

    pub fn chunks_for_doc(&self, doc_id: &str) -> Vec<ChunkRecord> {
        self.chunks
            .iter()
            .filter(|c| c.doc_id == doc_id)
            .cloned()
            .collect()
    }

    pub fn count_for_doc(&self, doc_id: &str) -> usize {
        self.chunks.iter().filter(|c| c.doc_id == doc_id).count()
    }

    /// Remove all entries of a document, compacting the matrix.
    /// Returns the removed pairs so a failed commit can restore them.
    pub fn delete_by_doc(&mut self, doc_id: &str) -> Vec<(Vec<f32>, ChunkRecord)> {
        let mut removed = Vec::new();
        let mut kept_vectors = Vec::with_capacity(self.vectors.len());
        let mut kept_chunks = Vec::with_capacity(self.chunks.len());

        for (vector, chunk) in self.vectors.drain(..).zip(self.chunks.drain(..)) {
            if chunk.doc_id == doc_id {
                removed.push((vector, chunk));
            } else {
                kept_vectors.push(vector);
                kept_chunks.push(chunk);
            }
        }
        self.vectors = kept_vectors;
        self.chunks = kept_chunks;
        removed
    }

    /// Re-insert pairs previously removed by [`VectorStore::delete_by_doc`].
    pub fn restore(&mut self, entries: Vec<(Vec<f32>, ChunkRecord)>) {
        for (vector, chunk) in entries {
            self.vectors.push(vector);
            self.chunks.push(chunk);
        }
    }

    /// Drop entries whose document is not active. Returns dropped count.
    pub fn reconcile(&mut self, active_doc_ids: &HashSet<String>) -> usize {
        let before = self.len();
        let mut kept_vectors = Vec::with_capacity(before);
        let mut kept_chunks = Vec::with_capacity(before);
        for (vector, chunk) in self.vectors.drain(..).zip(self.chunks.drain(..)) {
            if active_doc_ids.contains(&chunk.doc_id) {
                kept_vectors.push(vector);
                kept_chunks.push(chunk);
            }
        }
        self.vectors = kept_vectors;
        self.chunks = kept_chunks;
        let dropped = before - self.len();
        if dropped > 0 {
            warn!(dropped, "dropped orphan vector entries during reconciliation");
        }
        dropped
    }

    /// Per-document chunk counts, for registry cross-checks.
    pub fn doc_chunk_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for chunk in &self.chunks {
            *counts.entry(chunk.doc_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn index_path(base: &Path) -> PathBuf {
        base.with_extension("index")
    }

    fn docs_path(base: &Path) -> PathBuf {
        base.with_extension("docs")
    }

    pub fn exists(base: &Path) -> bool {
        Self::index_path(base).exists() && Self::docs_path(base).exists()
    }

    /// Persist both files atomically (write-temp + rename as a pair).
    pub fn save(&self, base: &Path) -> Result<(), DomainError> {
        if let Some(parent) = base.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DomainError::vector_store(format!("create {parent:?}: {e}")))?;
        }

        let index_file = IndexFile {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        let index_bytes = bincode::serialize(&index_file)
            .map_err(|e| DomainError::vector_store(format!("encode index: {e}")))?;
        let docs_bytes = serde_json::to_vec(&self.chunks)
            .map_err(|e| DomainError::vector_store(format!("encode docs: {e}")))?;

        let index_path = Self::index_path(base);
        let docs_path = Self::docs_path(base);
        let index_tmp = index_path.with_extension("index.tmp");
        let docs_tmp = docs_path.with_extension("docs.tmp");

        fs::write(&index_tmp, index_bytes)
            .map_err(|e| DomainError::vector_store(format!("write {index_tmp:?}: {e}")))?;
        fs::write(&docs_tmp, docs_bytes)
            .map_err(|e| DomainError::vector_store(format!("write {docs_tmp:?}: {e}")))?;
        fs::rename(&index_tmp, &index_path)
            .map_err(|e| DomainError::vector_store(format!("rename {index_tmp:?}: {e}")))?;
        fs::rename(&docs_tmp, &docs_path)
            .map_err(|e| DomainError::vector_store(format!("rename {docs_tmp:?}: {e}")))?;
        Ok(())
    }

    /// Load the pair, rejecting mismatched lengths.
    pub fn load(base: &Path) -> Result<Self, DomainError> {
        let index_bytes = fs::read(Self::index_path(base))
            .map_err(|e| DomainError::vector_store(format!("read index: {e}")))?;
        let docs_bytes = fs::read(Self::docs_path(base))
            .map_err(|e| DomainError::vector_store(format!("read docs: {e}")))?;

        let index_file: IndexFile = bincode::deserialize(&index_bytes)
            .map_err(|e| DomainError::vector_store(format!("decode index: {e}")))?;
        let chunks: Vec<ChunkRecord> = serde_json::from_slice(&docs_bytes)
            .map_err(|e| DomainError::vector_store(format!("decode docs: {e}")))?;

        if index_file.vectors.len() != chunks.len() {
            return Err(DomainError::vector_store(format!(
                "index/docs length mismatch: {} vectors, {} chunks",
                index_file.vectors.len(),
                chunks.len()
            )));
        }

        Ok(Self {
            dimension: index_file.dimension,
            vectors: index_file.vectors,
            chunks,
        })
    }
}
