//! Cross-encoder reranking with fused-order fallback

use std::sync::Arc;

use tracing::warn;

use crate::domain::rerank::RerankProvider;
use crate::domain::retrieval::SearchHit;

/// Rerank the fused candidates, falling back to the fused ordering if
/// the vendor call fails. The returned flag reports whether reranking
/// was actually applied.
pub async fn apply_rerank(
    provider: &Arc<dyn RerankProvider>,
    query: &str,
    mut hits: Vec<SearchHit>,
    top_k: usize,
    rerank_top_k: usize,
) -> (Vec<SearchHit>, bool) {
    if hits.is_empty() {
        return (hits, false);
    }

    hits.truncate(rerank_top_k);
    let documents: Vec<String> = hits.iter().map(|h| h.chunk.text.clone()).collect();

    match provider.rerank(query, &documents, rerank_top_k).await {
        Ok(ranked) => {
            let mut reranked: Vec<SearchHit> = Vec::with_capacity(top_k);
            for item in ranked.into_iter().take(top_k) {
                if let Some(base) = hits.get(item.index) {
                    let mut hit = base.clone();
                    hit.original_score = Some(base.score);
                    hit.score = item.relevance_score;
                    reranked.push(hit);
                }
            }
            (reranked, true)
        }
        Err(e) => {
            warn!(error = %e, "rerank failed, falling back to fused order");
            hits.truncate(top_k);
            (hits, false)
        }
    }
}
