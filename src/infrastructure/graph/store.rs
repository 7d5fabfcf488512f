//! Typed multigraph store persisted as `graph.bin`

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::document::DocType;
use crate::domain::graph::{Evidence, GraphEdge, GraphNode, NodeType, Relation, EDGE_WEIGHT_CAP};
use crate::domain::DomainError;

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct GraphFile {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<String, Vec<GraphEdge>>,
}

/// Node table + adjacency lists. BTreeMaps keep iteration and
/// serialization deterministic, which makes rebuilds byte-comparable.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<String, Vec<GraphEdge>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.get(node_id)
    }

    pub fn neighbors(&self, node_id: &str) -> &[GraphEdge] {
        self.edges.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn iter_edges(&self) -> impl Iterator<Item = (&String, &GraphEdge)> {
        self.edges
            .iter()
            .flat_map(|(source, edges)| edges.iter().map(move |e| (source, e)))
    }

    /// Insert or coalesce: same-id nodes merge attrs and union evidence.
    pub fn add_node(&mut self, node: GraphNode) {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                for (key, value) in node.attrs {
                    existing.attrs.entry(key).or_insert(value);
                }
                for evidence in node.evidence {
                    if !existing.evidence.iter().any(|e| e.key() == evidence.key()) {
                        existing.evidence.push(evidence);
                    }
                }
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
            }
        }
    }

    /// Add a directed edge, merging with an existing
    /// `(source, target, relation)` edge: weights sum capped at
    /// [`EDGE_WEIGHT_CAP`], evidence unions.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        relation: Relation,
        weight: f32,
        evidence: Vec<Evidence>,
    ) {
        if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
            return;
        }

        let edges = self.edges.entry(source.to_string()).or_default();
        if let Some(existing) = edges
            .iter_mut()
            .find(|e| e.target == target && e.relation == relation)
        {
            existing.weight = (existing.weight + weight).min(EDGE_WEIGHT_CAP);
            for item in evidence {
                if !existing.evidence.iter().any(|e| e.key() == item.key()) {
                    existing.evidence.push(item);
                }
            }
        } else {
            edges.push(GraphEdge {
                target: target.to_string(),
                relation,
                weight: weight.min(EDGE_WEIGHT_CAP),
                evidence,
            });
        }
    }

    /// Add both directions in one call.
    pub fn add_edge_bidirectional(
        &mut self,
        source: &str,
        target: &str,
        relation: Relation,
        weight: f32,
        evidence: Vec<Evidence>,
    ) {
        self.add_edge(source, target, relation, weight, evidence.clone());
        self.add_edge(target, source, relation.reverse(), weight, evidence);
    }

    /// Token-overlap + substring seed matching over non-structural
    /// node names.
    pub fn find_nodes_by_query(&self, query: &str, max_nodes: usize) -> Vec<(String, f32)> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        let tokens: Vec<String> = extract_query_tokens(&query)
            .into_iter()
            .filter(|t| t.chars().count() >= 2)
            .collect();

        let mut scored: Vec<(String, f32)> = Vec::new();
        for node in self.nodes.values() {
            if node.node_type.is_structural() {
                continue;
            }
            let name = node.name.to_lowercase();
            if name.is_empty() {
                continue;
            }

            let mut score = 0.0f32;
            if query.contains(&name) {
                score += 2.0;
            }
            for token in &tokens {
                if name.contains(token.as_str()) {
                    score += 1.0;
                }
            }
            if score > 0.0 {
                scored.push((node.id.clone(), score));
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(max_nodes);
        scored
    }

    /// Chunk node ids, optionally restricted to given doc types.
    pub fn chunk_node_ids(&self, doc_types: Option<&[DocType]>) -> BTreeSet<String> {
        self.nodes
            .values()
            .filter(|n| n.node_type == NodeType::Chunk)
            .filter(|n| match doc_types {
                Some(allowed) => n
                    .attrs
                    .get("doc_type")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<DocType>().ok())
                    .map_or(false, |t| allowed.contains(&t)),
                None => true,
            })
            .map(|n| n.id.clone())
            .collect()
    }

    /// Remove a document's structural nodes and every evidence entry
    /// referencing it; non-structural nodes left with no evidence are
    /// removed along with their edges.
    pub fn remove_doc(&mut self, doc_id: &str) {
        let mut removed: BTreeSet<String> = BTreeSet::new();

        for (id, node) in &self.nodes {
            let belongs = node.node_type.is_structural()
                && node
                    .attrs
                    .get("doc_id")
                    .and_then(|v| v.as_str())
                    .map_or(false, |d| d == doc_id);
            if belongs {
                removed.insert(id.clone());
            }
        }

        for (id, node) in self.nodes.iter_mut() {
            if removed.contains(id) {
                continue;
            }
            node.evidence.retain(|e| e.doc_id != doc_id);
            if !node.node_type.is_structural() && node.evidence.is_empty() {
                removed.insert(id.clone());
            }
        }

        for id in &removed {
            self.nodes.remove(id);
            self.edges.remove(id);
        }
        for edges in self.edges.values_mut() {
            edges.retain_mut(|edge| {
                if removed.contains(&edge.target) {
                    return false;
                }
                edge.evidence.retain(|e| e.doc_id != doc_id);
                !edge.evidence.is_empty()
            });
        }
        self.edges.retain(|_, edges| !edges.is_empty());
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    pub fn stats(&self) -> GraphStats {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            *by_type.entry(node.node_type.as_str().to_string()).or_insert(0) += 1;
        }
        GraphStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
            by_type,
        }
    }

    /// Digest of the serialised graph; equal digests mean equal graphs.
    pub fn digest(&self) -> Result<String, DomainError> {
        let bytes = self.encode()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn encode(&self) -> Result<Vec<u8>, DomainError> {
        let file = GraphFile {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        };
        bincode::serialize(&file)
            .map_err(|e| DomainError::graph_store(format!("encode graph: {e}")))
    }

    /// Single atomic write of nodes+edges.
    pub fn save(&self, path: &Path) -> Result<(), DomainError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DomainError::graph_store(format!("create {parent:?}: {e}")))?;
        }
        let bytes = self.encode()?;
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, bytes)
            .map_err(|e| DomainError::graph_store(format!("write {tmp:?}: {e}")))?;
        fs::rename(&tmp, path)
            .map_err(|e| DomainError::graph_store(format!("rename {tmp:?}: {e}")))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let bytes = fs::read(path)
            .map_err(|e| DomainError::graph_store(format!("read {path:?}: {e}")))?;
        let file: GraphFile = bincode::deserialize(&bytes)
            .map_err(|e| DomainError::graph_store(format!("decode {path:?}: {e}")))?;
        Ok(Self {
            nodes: file.nodes,
            edges: file.edges,
        })
    }
}

/// Alphanumeric + CJK token runs of the query.
fn extract_query_tokens(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in query.chars() {
        if c.is_alphanumeric() || ('\u{4e00}'..='\u{9fff}').contains(&c) {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{chunk_node_id, document_node_id, entity_node_id};

    fn evidence(doc: &str, chunk: &str) -> Evidence {
        Evidence::new(doc, chunk, "test", 0.9)
    }

    fn seeded_store() -> GraphStore {
        let mut store = GraphStore::new();
        store.add_node(
            GraphNode::new(document_node_id("d1"), NodeType::Document, "制度文件")
                .with_attr("doc_id", serde_json::json!("d1")),
        );
        store.add_node(
            GraphNode::new(chunk_node_id("d1:0"), NodeType::Chunk, "d1:0")
                .with_attr("doc_id", serde_json::json!("d1"))
                .with_attr("doc_type", serde_json::json!("internal_regulation")),
        );
        store.add_node(
            GraphNode::new(
                entity_node_id(NodeType::Department, "财政部"),
                NodeType::Department,
                "财政部",
            )
            .with_evidence(evidence("d1", "d1:0")),
        );
        store
    }

    #[test]
    fn test_node_coalescing_unions_evidence() {
        let mut store = seeded_store();
        let id = entity_node_id(NodeType::Department, "财政部");
        store.add_node(
            GraphNode::new(id.clone(), NodeType::Department, "财政部")
                .with_evidence(evidence("d1", "d1:0"))
                .with_evidence(evidence("d2", "d2:0")),
        );
        let node = store.get_node(&id).unwrap();
        assert_eq!(node.evidence.len(), 2);
    }

    #[test]
    fn test_edge_merge_caps_weight() {
        let mut store = seeded_store();
        let dept = entity_node_id(NodeType::Department, "财政部");
        let chunk = chunk_node_id("d1:0");
        for i in 0..10 {
            store.add_edge(
                &chunk,
                &dept,
                Relation::Mentions,
                1.0,
                vec![evidence("d1", &format!("d1:{i}"))],
            );
        }
        let edge = &store.neighbors(&chunk)[0];
        assert!(edge.weight <= EDGE_WEIGHT_CAP);
        assert_eq!(edge.evidence_count(), 10);
        assert_eq!(store.neighbors(&chunk).len(), 1);
    }

    #[test]
    fn test_edge_requires_both_endpoints() {
        let mut store = seeded_store();
        store.add_edge(
            "document:missing",
            &chunk_node_id("d1:0"),
            Relation::Contains,
            1.0,
            vec![],
        );
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_find_nodes_by_query() {
        let store = seeded_store();
        let matches = store.find_nodes_by_query("财政部的问题", 10);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].0.starts_with("department:"));
        // Structural nodes never match.
        assert!(store.find_nodes_by_query("制度文件", 10).is_empty());
    }

    #[test]
    fn test_remove_doc_drops_orphaned_entities() {
        let mut store = seeded_store();
        let dept = entity_node_id(NodeType::Department, "财政部");
        let chunk = chunk_node_id("d1:0");
        store.add_edge_bidirectional(
            &chunk,
            &dept,
            Relation::Mentions,
            1.0,
            vec![evidence("d1", "d1:0")],
        );

        store.remove_doc("d1");
        assert!(store.get_node(&chunk).is_none());
        assert!(store.get_node(&document_node_id("d1")).is_none());
        // Department's only evidence came from d1, so it goes too.
        assert!(store.get_node(&dept).is_none());
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_remove_doc_keeps_multi_doc_entities() {
        let mut store = seeded_store();
        let dept = entity_node_id(NodeType::Department, "财政部");
        store.add_node(
            GraphNode::new(dept.clone(), NodeType::Department, "财政部")
                .with_evidence(evidence("d2", "d2:1")),
        );
        store.remove_doc("d1");
        let node = store.get_node(&dept).unwrap();
        assert_eq!(node.evidence.len(), 1);
        assert_eq!(node.evidence[0].doc_id, "d2");
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = seeded_store();
        let b = seeded_store();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");
        let store = seeded_store();
        store.save(&path).unwrap();
        let loaded = GraphStore::load(&path).unwrap();
        assert_eq!(loaded.node_count(), store.node_count());
        assert_eq!(loaded.digest().unwrap(), store.digest().unwrap());
    }
}
