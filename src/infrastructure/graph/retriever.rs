//! Graph retriever: seed matching + bounded-hop expansion

use std::collections::{BTreeSet, HashMap};

use crate::domain::document::DocType;
use crate::domain::graph::NodeType;

use super::store::GraphStore;

/// Per-hop score decay applied on top of relation traversal weights.
const HOP_DECAY: f32 = 0.7;
/// Seed candidate cap.
const K_SEED: usize = 24;
/// Visited-node budget per search.
const N_MAX: usize = 400;

/// One graph-side retrieval result.
#[derive(Debug, Clone)]
pub struct GraphHit {
    pub chunk_id: String,
    pub score: f32,
    /// Node names along the path that reached the chunk, seed first.
    pub reached_via: Vec<String>,
}

/// Ranks chunks by proximity to query-matched entity nodes.
#[derive(Debug)]
pub struct GraphRetriever<'a> {
    graph: &'a GraphStore,
}

impl<'a> GraphRetriever<'a> {
    pub fn new(graph: &'a GraphStore) -> Self {
        Self { graph }
    }

    /// Seed, expand up to `hops`, score reachable chunks, normalise to
    /// [0, 1].
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        doc_types: Option<&[DocType]>,
        hops: u8,
    ) -> Vec<GraphHit> {
        let seeds = self.graph.find_nodes_by_query(query, K_SEED);
        if seeds.is_empty() {
            return Vec::new();
        }

        let allowed_chunks = self.graph.chunk_node_ids(doc_types);
        let hops = hops.clamp(1, 3);

        let mut chunk_scores: HashMap<String, f32> = HashMap::new();
        let mut chunk_paths: HashMap<String, Vec<String>> = HashMap::new();
        let mut visited_budget = N_MAX;

        for (seed_id, seed_score) in &seeds {
            if visited_budget == 0 {
                break;
            }
            self.expand_seed(
                seed_id,
                *seed_score,
                hops,
                &allowed_chunks,
                &mut chunk_scores,
                &mut chunk_paths,
                &mut visited_budget,
            );
        }

        let max_score = chunk_scores.values().cloned().fold(0.0f32, f32::max);
        if max_score <= 0.0 {
            return Vec::new();
        }

        let mut hits: Vec<GraphHit> = chunk_scores
            .into_iter()
            .map(|(chunk_id, score)| GraphHit {
                reached_via: chunk_paths.remove(&chunk_id).unwrap_or_default(),
                chunk_id,
                score: score / max_score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        hits
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_seed(
        &self,
        seed_id: &str,
        seed_score: f32,
        hops: u8,
        allowed_chunks: &BTreeSet<String>,
        chunk_scores: &mut HashMap<String, f32>,
        chunk_paths: &mut HashMap<String, Vec<String>>,
        visited_budget: &mut usize,
    ) {
        // (node, depth, path score, path names)
        let mut queue: std::collections::VecDeque<(String, u8, f32, Vec<String>)> =
            std::collections::VecDeque::new();
        let mut seen_depth: HashMap<String, u8> = HashMap::new();

        let seed_name = self
            .graph
            .get_node(seed_id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| seed_id.to_string());
        queue.push_back((seed_id.to_string(), 0, seed_score, vec![seed_name]));
        seen_depth.insert(seed_id.to_string(), 0);

        while let Some((node_id, depth, path_score, path)) = queue.pop_front() {
            if *visited_budget == 0 {
                return;
            }
            *visited_budget -= 1;

            let Some(node) = self.graph.get_node(&node_id) else {
                continue;
            };

            if node.node_type == NodeType::Chunk {
                if allowed_chunks.contains(&node_id) {
                    if let Some(chunk_id) = node.attrs.get("chunk_id").and_then(|v| v.as_str()) {
                        let entry = chunk_scores.entry(chunk_id.to_string()).or_insert(0.0);
                        *entry += path_score;
                        chunk_paths
                            .entry(chunk_id.to_string())
                            .or_insert_with(|| path.clone());
                    }
                }
            } else if !node.node_type.is_structural() {
                // Evidence chunks of visited entity nodes score too.
                for evidence in &node.evidence {
                    let evidence_node = crate::domain::graph::chunk_node_id(&evidence.chunk_id);
                    if allowed_chunks.contains(&evidence_node) {
                        let entry = chunk_scores.entry(evidence.chunk_id.clone()).or_insert(0.0);
                        *entry += path_score * evidence.confidence;
                        chunk_paths
                            .entry(evidence.chunk_id.clone())
                            .or_insert_with(|| path.clone());
                    }
                }
            }

            if depth >= hops {
                continue;
            }

            // Prefer heavier edges when the visit budget is tight.
            let mut edges: Vec<_> = self.graph.neighbors(&node_id).to_vec();
            edges.sort_by(|a, b| {
                b.weight
                    .partial_cmp(&a.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            for edge in edges {
                let next_depth = depth + 1;
                if let Some(&best) = seen_depth.get(&edge.target) {
                    if best <= next_depth {
                        continue;
                    }
                }
                seen_depth.insert(edge.target.clone(), next_depth);

                let step = edge.relation.traversal_weight()
                    * (edge.weight / crate::domain::graph::EDGE_WEIGHT_CAP).clamp(0.2, 1.0);
                let next_score = path_score * HOP_DECAY * step;

                let mut next_path = path.clone();
                if let Some(target) = self.graph.get_node(&edge.target) {
                    next_path.push(target.name.clone());
                }
                queue.push_back((edge.target.clone(), next_depth, next_score, next_path));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::DocType;
    use crate::domain::ingestion::{ChunkPiece, ChunkRecord, SemanticBoundary};
    use crate::infrastructure::graph::GraphBuilder;

    fn issue_chunk(doc_id: &str, ordinal: usize, dept: &str) -> ChunkRecord {
        ChunkRecord::from_piece(
            ChunkPiece::new(
                format!(
                    "问题序号: {ordinal}\n部门单位: {dept}\n问题摘要: 2023年预算执行违规问题\n整改情况: 已整改"
                ),
                SemanticBoundary::Row,
            ),
            ordinal,
            doc_id,
            DocType::AuditIssue,
            "整改台账",
            "issues.pdf",
        )
    }

    #[test]
    fn test_seed_and_expand_reaches_chunk() {
        let chunks = vec![issue_chunk("docA000000000001", 0, "财政部")];
        let graph = GraphBuilder::new().build(chunks.iter());
        let retriever = GraphRetriever::new(&graph);

        let hits = retriever.search("财政部的整改问题", 5, None, 2);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "docA000000000001:0");
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
        assert!(!hits[0].reached_via.is_empty());
    }

    #[test]
    fn test_scores_normalised_and_ordered() {
        let chunks = vec![
            issue_chunk("docA000000000001", 0, "财政部"),
            issue_chunk("docA000000000001", 1, "教育部"),
        ];
        let graph = GraphBuilder::new().build(chunks.iter());
        let retriever = GraphRetriever::new(&graph);

        let hits = retriever.search("财政部", 5, None, 2);
        assert!(!hits.is_empty());
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        // The chunk mentioning the queried department outranks the other.
        assert_eq!(hits[0].chunk_id, "docA000000000001:0");
    }

    #[test]
    fn test_doc_type_filter_blocks_chunks() {
        let chunks = vec![issue_chunk("docA000000000001", 0, "财政部")];
        let graph = GraphBuilder::new().build(chunks.iter());
        let retriever = GraphRetriever::new(&graph);

        let regulation_only = [DocType::InternalRegulation];
        let hits = retriever.search("财政部", 5, Some(&regulation_only), 2);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_no_seeds_no_hits() {
        let chunks = vec![issue_chunk("docA000000000001", 0, "财政部")];
        let graph = GraphBuilder::new().build(chunks.iter());
        let retriever = GraphRetriever::new(&graph);
        assert!(retriever.search("毫不相关的查询词汇", 5, None, 2).is_empty());
    }
}
