//! Rerank provider trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;

/// One reranked entry: the index into the submitted document list plus
/// the cross-encoder relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub index: usize,
    pub relevance_score: f32,
}

/// Trait for cross-encoding rerank providers.
#[async_trait]
pub trait RerankProvider: Send + Sync + Debug {
    /// Re-score `documents` against `query`, returning at most `top_k`
    /// items sorted by relevance descending.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RankedItem>, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock reranker scoring by shared-character overlap with the query.
    #[derive(Debug)]
    pub struct MockRerankProvider {
        call_count: AtomicUsize,
        error: Option<String>,
    }

    impl MockRerankProvider {
        pub fn new() -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                error: None,
            }
        }

        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    impl Default for MockRerankProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RerankProvider for MockRerankProvider {
        async fn rerank(
            &self,
            query: &str,
            documents: &[String],
            top_k: usize,
        ) -> Result<Vec<RankedItem>, DomainError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(ref error) = self.error {
                return Err(DomainError::rerank(error.clone()));
            }

            let query_chars: std::collections::HashSet<char> = query.chars().collect();
            let mut scored: Vec<RankedItem> = documents
                .iter()
                .enumerate()
                .map(|(index, doc)| {
                    let overlap = doc.chars().filter(|c| query_chars.contains(c)).count();
                    RankedItem {
                        index,
                        relevance_score: overlap as f32 / (doc.chars().count().max(1) as f32),
                    }
                })
                .collect();
            scored.sort_by(|a, b| {
                b.relevance_score
                    .partial_cmp(&a.relevance_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            scored.truncate(top_k);
            Ok(scored)
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_rerank_orders_by_overlap() {
            let provider = MockRerankProvider::new();
            let docs = vec!["完全无关".to_string(), "B的规定相关".to_string()];
            let ranked = provider.rerank("B的规定", &docs, 2).await.unwrap();
            assert_eq!(ranked[0].index, 1);
            assert_eq!(provider.call_count(), 1);
        }

        #[tokio::test]
        async fn test_mock_rerank_truncates() {
            let provider = MockRerankProvider::new();
            let docs: Vec<String> = (0..5).map(|i| format!("doc {i}")).collect();
            let ranked = provider.rerank("doc", &docs, 2).await.unwrap();
            assert_eq!(ranked.len(), 2);
        }

        #[tokio::test]
        async fn test_mock_rerank_error() {
            let provider = MockRerankProvider::new().with_error("vendor down");
            assert!(provider.rerank("q", &["d".to_string()], 1).await.is_err());
        }
    }
}
