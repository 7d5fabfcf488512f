//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::DomainError;

/// Trait for embedding providers (DashScope, OpenAI-compatible, etc.)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Map a batch of texts to fixed-dimension vectors, in input order.
    ///
    /// The batch fails atomically: on error no vector of the batch is
    /// usable. Callers must respect [`EmbeddingProvider::batch_size`].
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;

    /// Declared vector dimensionality.
    fn dimension(&self) -> usize;

    /// Maximum batch size the provider accepts per call.
    fn batch_size(&self) -> usize {
        32
    }

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

/// Embed an arbitrary number of texts by splitting into provider-sized
/// batches. Fails on the first failing batch.
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, DomainError> {
    let batch = provider.batch_size().max(1);
    let mut out = Vec::with_capacity(texts.len());
    for window in texts.chunks(batch) {
        let mut vectors = provider.embed(window).await?;
        if vectors.len() != window.len() {
            return Err(DomainError::embedding(
                format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    window.len()
                ),
                false,
            ));
        }
        for v in &vectors {
            if v.len() != provider.dimension() {
                return Err(DomainError::embedding(
                    format!(
                        "provider returned dimension {} (declared {})",
                        v.len(),
                        provider.dimension()
                    ),
                    false,
                ));
            }
        }
        out.append(&mut vectors);
    }
    Ok(out)
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic mock embedding provider.
    ///
    /// Vectors are bags of hashed character uni/bigrams, so texts sharing
    /// characters land close under cosine similarity. Good enough to
    /// exercise retrieval ordering without a live model.
    #[derive(Debug)]
    pub struct MockEmbeddingProvider {
        dimension: usize,
        call_count: AtomicUsize,
        error: Option<String>,
    }

    impl MockEmbeddingProvider {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
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

        fn embed_one(&self, text: &str) -> Vec<f32> {
            let mut vector = vec![0.0f32; self.dimension];
            let chars: Vec<char> = text.chars().collect();
            for (i, &c) in chars.iter().enumerate() {
                let uni = c as u64;
                vector[(uni % self.dimension as u64) as usize] += 1.0;
                if let Some(&next) = chars.get(i + 1) {
                    let bi = uni
                        .wrapping_mul(31)
                        .wrapping_add(next as u64)
                        .wrapping_mul(1_000_003);
                    vector[(bi % self.dimension as u64) as usize] += 1.0;
                }
            }
            vector
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(ref error) = self.error {
                return Err(DomainError::embedding(error.clone(), false));
            }
            Ok(texts.iter().map(|t| self.embed_one(t)).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn cosine(a: &[f32], b: &[f32]) -> f32 {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if na == 0.0 || nb == 0.0 {
                0.0
            } else {
                dot / (na * nb)
            }
        }

        #[tokio::test]
        async fn test_deterministic() {
            let provider = MockEmbeddingProvider::new(64);
            let a = provider.embed(&["第二条 B修改。".to_string()]).await.unwrap();
            let b = provider.embed(&["第二条 B修改。".to_string()]).await.unwrap();
            assert_eq!(a, b);
            assert_eq!(provider.call_count(), 2);
        }

        #[tokio::test]
        async fn test_shared_characters_score_higher() {
            let provider = MockEmbeddingProvider::new(128);
            let vectors = provider
                .embed(&[
                    "B的规定".to_string(),
                    "第二条 B修改。".to_string(),
                    "第一条 A内容。".to_string(),
                ])
                .await
                .unwrap();
            let query_vs_b = cosine(&vectors[0], &vectors[1]);
            let query_vs_a = cosine(&vectors[0], &vectors[2]);
            assert!(query_vs_b > query_vs_a);
        }

        #[tokio::test]
        async fn test_error_mode() {
            let provider = MockEmbeddingProvider::new(8).with_error("down");
            assert!(provider.embed(&["x".to_string()]).await.is_err());
        }

        #[tokio::test]
        async fn test_embed_in_batches_respects_cap() {
            let provider = MockEmbeddingProvider::new(16);
            let texts: Vec<String> = (0..70).map(|i| format!("text {i}")).collect();
            let vectors = embed_in_batches(&provider, &texts).await.unwrap();
            assert_eq!(vectors.len(), 70);
            // 70 inputs at a batch cap of 32 means three provider calls
            assert_eq!(provider.call_count(), 3);
        }
    }
}
