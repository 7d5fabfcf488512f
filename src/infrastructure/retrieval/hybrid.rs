//! Hybrid score fusion: min-max normalise both sides, blend with α

use std::collections::HashMap;

use crate::domain::ingestion::ChunkRecord;
use crate::domain::retrieval::SearchHit;

/// Min-max normalise a keyed score map to [0, 1]. A constant map
/// collapses to all-ones.
fn normalized_score_map(scores: &HashMap<String, f32>) -> HashMap<String, f32> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.values().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.values().cloned().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < 1e-9 {
        return scores.keys().map(|k| (k.clone(), 1.0)).collect();
    }
    scores
        .iter()
        .map(|(k, v)| (k.clone(), (v - min) / (max - min)))
        .collect()
}

/// Fuse vector and graph result lists.
///
/// `final = α·vector + (1−α)·graph` over normalised scores; a chunk
/// found by only one side keeps the other side's contribution at 0;
/// duplicates collapse to the max per side. The endpoints are exact:
/// α=1.0 returns the vector list untouched and α=0.0 the graph list,
/// preserving raw scores and order.
pub fn fuse_hybrid(
    vector_hits: Vec<(ChunkRecord, f32)>,
    graph_hits: Vec<(ChunkRecord, f32)>,
    alpha: f32,
) -> Vec<SearchHit> {
    let alpha = alpha.clamp(0.0, 1.0);

    if alpha >= 1.0 {
        return vector_hits
            .into_iter()
            .map(|(chunk, score)| SearchHit::vector(chunk, score))
            .collect();
    }
    if alpha <= 0.0 {
        return graph_hits
            .into_iter()
            .map(|(chunk, score)| SearchHit::graph(chunk, score))
            .collect();
    }

    let mut chunks: HashMap<String, ChunkRecord> = HashMap::new();
    let mut vector_scores: HashMap<String, f32> = HashMap::new();
    let mut graph_scores: HashMap<String, f32> = HashMap::new();

    for (chunk, score) in vector_hits {
        let key = chunk.chunk_id.clone();
        let entry = vector_scores.entry(key.clone()).or_insert(f32::NEG_INFINITY);
        *entry = entry.max(score);
        chunks.entry(key).or_insert(chunk);
    }
    for (chunk, score) in graph_hits {
        let key = chunk.chunk_id.clone();
        let entry = graph_scores.entry(key.clone()).or_insert(f32::NEG_INFINITY);
        *entry = entry.max(score);
        chunks.entry(key).or_insert(chunk);
    }

    let vector_norm = normalized_score_map(&vector_scores);
    let graph_norm = normalized_score_map(&graph_scores);

    let mut fused: Vec<SearchHit> = chunks
        .into_iter()
        .map(|(key, chunk)| {
            let v = vector_norm.get(&key).copied().unwrap_or(0.0);
            let g = graph_norm.get(&key).copied().unwrap_or(0.0);
            SearchHit {
                chunk,
                score: alpha * v + (1.0 - alpha) * g,
                vector_score: vector_scores.get(&key).copied(),
                graph_score: graph_scores.get(&key).copied(),
                original_score: None,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    fused
}
