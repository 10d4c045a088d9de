use async_trait::async_trait;
use tracing::debug;

use common::{
    document::{Document, ScoredDocument},
    error::AppError,
    utils::embedding::EmbeddingProvider,
};

/// Dense similarity ranking over an embedding index.
///
/// Implementations are black boxes to the fusion engine; the only contract
/// is that results come back in relevance order. `search_with_scores` is
/// the preferred entry point, `search` the degraded variant for backends
/// that cannot surface raw scores.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search_with_scores(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, AppError>;

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, AppError>;
}

/// Sparse lexical ranking over a fixed collection, pre-configured with a
/// result-count ceiling. Results are in relevance order; raw scores are
/// not part of the contract.
#[async_trait]
pub trait KeywordSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Document>, AppError>;
}

/// Brute-force cosine index over pre-embedded documents.
///
/// Good enough for corpus sizes in the tens of thousands; anything larger
/// belongs behind a dedicated ANN engine implementing [`VectorSearch`].
pub struct InMemoryVectorIndex {
    embedder: EmbeddingProvider,
    entries: Vec<(Document, Vec<f32>)>,
}

impl InMemoryVectorIndex {
    pub async fn build(
        embedder: EmbeddingProvider,
        documents: Vec<Document>,
    ) -> Result<Self, AppError> {
        let texts: Vec<String> = documents.iter().map(|doc| doc.content.clone()).collect();
        let embeddings = embedder
            .embed_batch(texts)
            .await
            .map_err(|e| AppError::Provider(format!("embedding corpus: {e}")))?;

        if embeddings.len() != documents.len() {
            return Err(AppError::Provider(format!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        debug!(
            documents = documents.len(),
            backend = embedder.backend_label(),
            "Built in-memory vector index"
        );

        Ok(Self {
            embedder,
            entries: documents.into_iter().zip(embeddings).collect(),
        })
    }

    async fn ranked(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, AppError> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| AppError::Provider(format!("embedding query: {e}")))?;

        let mut scored: Vec<ScoredDocument> = self
            .entries
            .iter()
            .map(|(doc, embedding)| {
                ScoredDocument::new(doc.clone(), cosine_similarity(&query_embedding, embedding))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl VectorSearch for InMemoryVectorIndex {
    async fn search_with_scores(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, AppError> {
        self.ranked(query, k).await
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, AppError> {
        let ranked = self.ranked(query, k).await?;
        Ok(ranked.into_iter().map(|entry| entry.document).collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn index_ranks_by_token_overlap_with_hashed_embedder() {
        let embedder = EmbeddingProvider::new_hashed(256);
        let docs = vec![
            Document::from_content("해운대 해수욕장 바다 피서"),
            Document::from_content("갈비 맛집 숯불 점심"),
            Document::from_content("전망대 야경 케이블카"),
        ];
        let index = InMemoryVectorIndex::build(embedder, docs).await.unwrap();

        let results = index.search_with_scores("갈비 맛집", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].document.content.contains("갈비"));
        assert!(results[0].score >= results[1].score);
    }
}
