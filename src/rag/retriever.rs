use std::sync::Arc;

use serde::Serialize;

use crate::core::errors::ApiError;
use crate::embedding::EmbeddingProvider;
use crate::rag::chunker::Passage;
use crate::rag::index::{ScoredPassage, VectorIndex};

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub index_size: usize,
    pub embedding_dimension: usize,
    pub model: String,
}

/// Embeds text through the provider and queries the index. All vectors are
/// L2-normalized on the way in, so index scores are cosine similarities.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Retriever { embedder, index }
    }

    pub async fn add_passages(&self, passages: Vec<Passage>) -> Result<usize, ApiError> {
        if passages.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let mut vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != passages.len() {
            return Err(ApiError::Internal(format!(
                "embedded {} of {} passages",
                vectors.len(),
                passages.len()
            )));
        }
        for vector in &mut vectors {
            normalize_l2(vector);
        }
        self.index
            .add(passages.into_iter().zip(vectors).collect())
            .await
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredPassage>, ApiError> {
        // an empty index answers without touching the embedding endpoint
        if self.index.count().await == 0 {
            return Ok(Vec::new());
        }
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(mut vector) = vectors.pop() else {
            return Err(ApiError::Internal(
                "embedding endpoint returned no vector for query".to_string(),
            ));
        };
        normalize_l2(&mut vector);
        self.index.search(&vector, top_k).await
    }

    pub async fn stats(&self) -> IndexStats {
        let total = self.index.count().await;
        IndexStats {
            total_chunks: total,
            index_size: total,
            embedding_dimension: self.index.dimension(),
            model: self.embedder.model_name().to_string(),
        }
    }

    pub async fn clear(&self) -> Result<(), ApiError> {
        self.index.clear().await
    }
}

pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::index::FlatIndex;
    use async_trait::async_trait;

    /// Deterministic bag-of-words embedder: each word lands in a hashed
    /// bucket, so shared vocabulary means cosine similarity.
    struct HashEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        fn model_name(&self) -> &str {
            "hash-embedder"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; self.dimension];
                    for word in text.to_lowercase().split_whitespace() {
                        let mut h = 0usize;
                        for b in word.bytes() {
                            h = h.wrapping_mul(31).wrapping_add(b as usize);
                        }
                        v[h % self.dimension] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            8
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(false)
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Err(ApiError::provider("Embedding", "connection refused"))
        }
    }

    fn make_passage(id: &str, text: &str) -> Passage {
        Passage {
            id: id.to_string(),
            text: text.to_string(),
            source: "policy.txt".to_string(),
            chunk_index: 0,
        }
    }

    fn test_retriever(dimension: usize) -> Retriever {
        Retriever::new(
            Arc::new(HashEmbedder { dimension }),
            Arc::new(FlatIndex::in_memory(dimension, "hash-embedder")),
        )
    }

    #[test]
    fn normalize_l2_makes_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        normalize_l2(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize_l2(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn retrieves_most_similar_passage_first() {
        let retriever = test_retriever(256);
        retriever
            .add_passages(vec![
                make_passage("p0", "return refund receipt exchange window"),
                make_passage("p1", "shipping ground freight delivery estimate"),
                make_passage("p2", "warranty parts labor coverage period"),
            ])
            .await
            .unwrap();

        let hits = retriever.retrieve("return refund receipt", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].passage.id, "p0");
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].score <= 1.0 + 1e-6);
    }

    #[tokio::test]
    async fn empty_index_skips_embedding_entirely() {
        let retriever = Retriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(FlatIndex::in_memory(8, "failing")),
        );
        let hits = retriever.retrieve("anything", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn stats_reflect_index_and_model() {
        let retriever = test_retriever(64);
        retriever
            .add_passages(vec![make_passage("p0", "return policy")])
            .await
            .unwrap();

        let stats = retriever.stats().await;
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.index_size, 1);
        assert_eq!(stats.embedding_dimension, 64);
        assert_eq!(stats.model, "hash-embedder");
    }
}
