//! Content-addressed document registry backed by `registry.json`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::domain::document::{DocStatus, DocType, DocumentRecord};
use crate::domain::DomainError;

/// Outcome of the dedup check before committing an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestDecision {
    /// Unseen content and filename.
    New,
    /// Byte-identical active document already registered.
    Duplicate { doc_id: String },
    /// Same filename, different content: replaces the prior version.
    Update { old_doc_id: String, next_version: u32 },
}

/// Filters for document listing.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub doc_type: Option<DocType>,
    pub keyword: Option<String>,
    pub include_deleted: bool,
}

/// Aggregate stats over the registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_documents: usize,
    pub active_documents: usize,
    pub deleted_documents: usize,
    pub total_chunks: usize,
    pub total_size_bytes: u64,
    pub by_type: BTreeMap<String, TypeStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeStats {
    pub count: usize,
    pub chunks: usize,
}

/// Document table: content-hash dedup, version history, logical delete.
#[derive(Debug)]
pub struct DocumentRegistry {
    path: PathBuf,
    documents: BTreeMap<String, DocumentRecord>,
}

impl DocumentRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            documents: BTreeMap::new(),
        }
    }

    /// Load from disk; a missing file yields an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::new(path));
        }
        let bytes = fs::read(&path)
            .map_err(|e| DomainError::registry(format!("read {path:?}: {e}")))?;
        let documents: BTreeMap<String, DocumentRecord> = serde_json::from_slice(&bytes)
            .map_err(|e| DomainError::registry(format!("decode {path:?}: {e}")))?;
        info!(documents = documents.len(), "loaded document registry");
        Ok(Self { path, documents })
    }

    /// Persist via write-temp + atomic rename.
    pub fn save(&self) -> Result<(), DomainError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DomainError::registry(format!("create {parent:?}: {e}")))?;
        }
        let bytes = serde_json::to_vec_pretty(&self.documents)
            .map_err(|e| DomainError::registry(format!("encode registry: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .map_err(|e| DomainError::registry(format!("write {tmp:?}: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| DomainError::registry(format!("rename {tmp:?}: {e}")))?;
        Ok(())
    }

    /// Dedup check: duplicate iff same hash is active; update iff the
    /// filename matches an active document with different content.
    pub fn ingest_decision(&self, content_hash: &str, filename: &str) -> IngestDecision {
        if let Some(existing) = self
            .documents
            .values()
            .find(|d| d.is_active() && d.content_hash == content_hash)
        {
            return IngestDecision::Duplicate {
                doc_id: existing.doc_id.clone(),
            };
        }
        if let Some(existing) = self
            .documents
            .values()
            .find(|d| d.is_active() && d.filename == filename)
        {
            return IngestDecision::Update {
                old_doc_id: existing.doc_id.clone(),
                next_version: existing.version + 1,
            };
        }
        IngestDecision::New
    }

    /// Register a brand-new document row.
    pub fn insert_new(&mut self, record: DocumentRecord) -> Result<(), DomainError> {
        if let Some(existing) = self.documents.get(&record.doc_id) {
            if existing.is_active() {
                return Err(DomainError::conflict(format!(
                    "document {} already active",
                    record.doc_id
                )));
            }
        }
        self.documents.insert(record.doc_id.clone(), record);
        Ok(())
    }

    /// Replace the prior version's row with the new one. The old row is
    /// removed so `(content_hash, active)` stays unique; the returned
    /// record lets a failed commit restore it.
    pub fn replace_for_update(
        &mut self,
        old_doc_id: &str,
        record: DocumentRecord,
    ) -> Result<DocumentRecord, DomainError> {
        let old = self
            .documents
            .remove(old_doc_id)
            .ok_or_else(|| DomainError::not_found(format!("document {old_doc_id} not found")))?;
        self.documents.insert(record.doc_id.clone(), record);
        Ok(old)
    }

    /// Undo helper for a failed update commit.
    pub fn restore_replaced(&mut self, new_doc_id: &str, old: DocumentRecord) {
        self.documents.remove(new_doc_id);
        self.documents.insert(old.doc_id.clone(), old);
    }

    /// Mark a document deleted, retaining the row for audit.
    pub fn logical_delete(&mut self, doc_id: &str) -> Result<DocumentRecord, DomainError> {
        let record = self
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| DomainError::not_found(format!("document {doc_id} not found")))?;
        if record.status == DocStatus::Deleted {
            return Err(DomainError::not_found(format!(
                "document {doc_id} already deleted"
            )));
        }
        record.status = DocStatus::Deleted;
        record.chunk_count = 0;
        Ok(record.clone())
    }

    pub fn get(&self, doc_id: &str) -> Option<&DocumentRecord> {
        self.documents.get(doc_id)
    }

    pub fn get_active(&self, doc_id: &str) -> Option<&DocumentRecord> {
        self.documents.get(doc_id).filter(|d| d.is_active())
    }

    pub fn list(&self, query: &DocumentQuery) -> Vec<DocumentRecord> {
        let mut records: Vec<DocumentRecord> = self
            .documents
            .values()
            .filter(|d| query.include_deleted || d.is_active())
            .filter(|d| query.doc_type.map_or(true, |t| d.doc_type == t))
            .filter(|d| {
                query.keyword.as_deref().map_or(true, |k| {
                    let k = k.to_lowercase();
                    d.filename.to_lowercase().contains(&k) || d.title.to_lowercase().contains(&k)
                })
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.upload_time.cmp(&a.upload_time));
        records
    }

    pub fn active_records(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.documents.values().filter(|d| d.is_active())
    }

    pub fn stats(&self) -> RegistryStats {
        let mut by_type: BTreeMap<String, TypeStats> = BTreeMap::new();
        let mut active = 0usize;
        let mut deleted = 0usize;
        let mut total_chunks = 0usize;
        let mut total_size = 0u64;

        for record in self.documents.values() {
            match record.status {
                DocStatus::Active => {
                    active += 1;
                    total_chunks += record.chunk_count;
                    total_size += record.file_size;
                    let entry = by_type.entry(record.doc_type.as_str().to_string()).or_default();
                    entry.count += 1;
                    entry.chunks += record.chunk_count;
                }
                DocStatus::Deleted => deleted += 1,
            }
        }

        RegistryStats {
            total_documents: self.documents.len(),
            active_documents: active,
            deleted_documents: deleted,
            total_chunks,
            total_size_bytes: total_size,
            by_type,
        }
    }

    /// Drop every row and remove the storage file.
    pub fn clear_all(&mut self) -> Result<usize, DomainError> {
        let removed = self.documents.len();
        self.documents.clear();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| DomainError::registry(format!("remove {:?}: {e}", self.path)))?;
        }
        Ok(removed)
    }

    /// Startup reconciliation against the vector store's per-document
    /// chunk counts: rows with no surviving chunks are dropped.
    /// Returns the doc_ids that were dropped.
    pub fn reconcile(&mut self, vector_counts: &std::collections::HashMap<String, usize>) -> Vec<String> {
        let stale: Vec<String> = self
            .documents
            .values()
            .filter(|d| d.is_active() && vector_counts.get(&d.doc_id).copied().unwrap_or(0) == 0)
            .map(|d| d.doc_id.clone())
            .collect();
        for doc_id in &stale {
            self.documents.remove(doc_id);
        }
        if !stale.is_empty() {
            tracing::warn!(dropped = stale.len(), "dropped uncommitted registry rows");
        }
        stale
    }

    /// Align surviving rows' chunk counts with the vector store.
    /// Returns how many rows were adjusted.
    pub fn sync_chunk_counts(
        &mut self,
        vector_counts: &std::collections::HashMap<String, usize>,
    ) -> usize {
        let mut adjusted = 0;
        for record in self.documents.values_mut() {
            if !record.is_active() {
                continue;
            }
            let actual = vector_counts.get(&record.doc_id).copied().unwrap_or(0);
            if actual > 0 && record.chunk_count != actual {
                record.chunk_count = actual;
                adjusted += 1;
            }
        }
        adjusted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Build a fresh record for a committed upload.
pub fn new_record(
    doc_id: &str,
    filename: &str,
    title: &str,
    doc_type: DocType,
    content_hash: &str,
    file_size: u64,
    version: u32,
    chunk_count: usize,
) -> DocumentRecord {
    DocumentRecord {
        doc_id: doc_id.to_string(),
        filename: filename.to_string(),
        title: title.to_string(),
        doc_type,
        content_hash: content_hash.to_string(),
        file_size,
        upload_time: Utc::now(),
        version,
        status: DocStatus::Active,
        chunk_count,
        tags: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc_id: &str, filename: &str, hash: &str) -> DocumentRecord {
        new_record(
            doc_id,
            filename,
            filename,
            DocType::InternalRegulation,
            hash,
            100,
            1,
            2,
        )
    }

    #[test]
    fn test_decision_new_then_duplicate() {
        let mut registry = DocumentRegistry::new("/tmp/never-written.json");
        assert_eq!(
            registry.ingest_decision("hash-a", "regs.txt"),
            IngestDecision::New
        );
        registry.insert_new(record("doc-a", "regs.txt", "hash-a")).unwrap();
        assert_eq!(
            registry.ingest_decision("hash-a", "regs.txt"),
            IngestDecision::Duplicate {
                doc_id: "doc-a".to_string()
            }
        );
    }

    #[test]
    fn test_decision_update_on_same_filename() {
        let mut registry = DocumentRegistry::new("/tmp/never-written.json");
        registry.insert_new(record("doc-a", "regs.txt", "hash-a")).unwrap();
        assert_eq!(
            registry.ingest_decision("hash-b", "regs.txt"),
            IngestDecision::Update {
                old_doc_id: "doc-a".to_string(),
                next_version: 2
            }
        );
    }

    #[test]
    fn test_replace_keeps_hash_uniqueness() {
        let mut registry = DocumentRegistry::new("/tmp/never-written.json");
        registry.insert_new(record("doc-a", "regs.txt", "hash-a")).unwrap();
        let mut updated = record("doc-b", "regs.txt", "hash-b");
        updated.version = 2;
        let old = registry.replace_for_update("doc-a", updated).unwrap();
        assert_eq!(old.doc_id, "doc-a");
        assert!(registry.get("doc-a").is_none());
        assert_eq!(registry.get("doc-b").unwrap().version, 2);
    }

    #[test]
    fn test_logical_delete_retains_audit_row() {
        let mut registry = DocumentRegistry::new("/tmp/never-written.json");
        registry.insert_new(record("doc-a", "regs.txt", "hash-a")).unwrap();
        registry.logical_delete("doc-a").unwrap();

        assert!(registry.get_active("doc-a").is_none());
        assert!(registry.get("doc-a").is_some());
        // Deleting again is NotFound, and re-upload of the same bytes is New.
        assert!(registry.logical_delete("doc-a").is_err());
        assert_eq!(
            registry.ingest_decision("hash-a", "regs.txt"),
            IngestDecision::New
        );
    }

    #[test]
    fn test_stats_by_type() {
        let mut registry = DocumentRegistry::new("/tmp/never-written.json");
        registry.insert_new(record("doc-a", "a.txt", "h1")).unwrap();
        registry.insert_new(record("doc-b", "b.txt", "h2")).unwrap();
        registry.logical_delete("doc-b").unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.active_documents, 1);
        assert_eq!(stats.deleted_documents, 1);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.by_type["internal_regulation"].count, 1);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let mut registry = DocumentRegistry::new(&path);
        registry.insert_new(record("doc-a", "regs.txt", "hash-a")).unwrap();
        registry.save().unwrap();

        let loaded = DocumentRegistry::load(&path).unwrap();
        assert_eq!(loaded.get("doc-a").unwrap().filename, "regs.txt");
    }

    #[test]
    fn test_reconcile_drops_rows_without_chunks() {
        let mut registry = DocumentRegistry::new("/tmp/never-written.json");
        registry.insert_new(record("committed", "a.txt", "h1")).unwrap();
        registry.insert_new(record("half-done", "b.txt", "h2")).unwrap();

        let mut counts = std::collections::HashMap::new();
        counts.insert("committed".to_string(), 2);
        let dropped = registry.reconcile(&counts);
        assert_eq!(dropped, vec!["half-done".to_string()]);
        assert!(registry.get("half-done").is_none());
    }

    #[test]
    fn test_list_filters() {
        let mut registry = DocumentRegistry::new("/tmp/never-written.json");
        registry.insert_new(record("doc-a", "制度.txt", "h1")).unwrap();
        let mut issue = record("doc-b", "整改台账.txt", "h2");
        issue.doc_type = DocType::AuditIssue;
        registry.insert_new(issue).unwrap();

        let by_type = registry.list(&DocumentQuery {
            doc_type: Some(DocType::AuditIssue),
            ..Default::default()
        });
        assert_eq!(by_type.len(), 1);

        let by_keyword = registry.list(&DocumentQuery {
            keyword: Some("台账".to_string()),
            ..Default::default()
        });
        assert_eq!(by_keyword.len(), 1);
        assert_eq!(by_keyword[0].doc_id, "doc-b");
    }
}
