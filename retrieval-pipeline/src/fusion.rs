use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use common::{
    document::{Document, ScoredDocument},
    error::AppError,
};

use crate::{
    providers::{KeywordSearch, VectorSearch},
    scoring::{convex_combine, reciprocal_rank_scores, tmm_normalize},
};

/// Hybrid retrieval over one dense and one sparse provider.
///
/// Scores from both sides are TMM-normalized independently, then combined
/// with `alpha * vector + (1 - alpha) * keyword`. Provider failures
/// degrade to the surviving side; this boundary never raises, and an
/// empty result means "no results", not an error.
pub struct HybridSearch {
    vector: Arc<dyn VectorSearch>,
    keyword: Arc<dyn KeywordSearch>,
    alpha: f32,
}

struct FusedCandidate {
    document: Document,
    vector_score: f32,
    keyword_score: f32,
}

impl HybridSearch {
    /// `alpha` is the vector-side weight of the convex combination.
    /// An out-of-range alpha is a caller bug, not a degraded input.
    pub fn new(
        vector: Arc<dyn VectorSearch>,
        keyword: Arc<dyn KeywordSearch>,
        alpha: f32,
    ) -> Result<Self, AppError> {
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(AppError::Validation(format!(
                "hybrid alpha must be within [0, 1], got {alpha}"
            )));
        }
        Ok(Self {
            vector,
            keyword,
            alpha,
        })
    }

    #[instrument(skip(self), fields(alpha = self.alpha))]
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Document> {
        let (vector_results, keyword_results) =
            tokio::join!(self.fetch_vector(query, limit), self.fetch_keyword(query));

        debug!(
            vector_candidates = vector_results.len(),
            keyword_candidates = keyword_results.len(),
            "Hybrid candidate counts"
        );

        match (vector_results.is_empty(), keyword_results.is_empty()) {
            (true, true) => Vec::new(),
            (false, true) => vector_results
                .into_iter()
                .take(limit)
                .map(|entry| entry.document)
                .collect(),
            (true, false) => keyword_results.into_iter().take(limit).collect(),
            (false, false) => self.fuse(vector_results, keyword_results, limit),
        }
    }

    /// Dense side with two fallback tiers: scoreless search with
    /// rank-derived scores when the scored variant fails, then empty.
    async fn fetch_vector(&self, query: &str, limit: usize) -> Vec<ScoredDocument> {
        match self.vector.search_with_scores(query, limit).await {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "Scored vector search failed; retrying without scores");
                match self.vector.search(query, limit).await {
                    Ok(documents) => {
                        let len = documents.len();
                        documents
                            .into_iter()
                            .enumerate()
                            .map(|(i, document)| {
                                ScoredDocument::new(document, 1.0 - (i as f32 / len as f32))
                            })
                            .collect()
                    }
                    Err(err) => {
                        warn!(error = %err, "Vector search unavailable; continuing keyword-only");
                        Vec::new()
                    }
                }
            }
        }
    }

    async fn fetch_keyword(&self, query: &str) -> Vec<Document> {
        match self.keyword.search(query).await {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "Keyword search unavailable; continuing vector-only");
                Vec::new()
            }
        }
    }

    fn fuse(
        &self,
        vector_results: Vec<ScoredDocument>,
        keyword_results: Vec<Document>,
        limit: usize,
    ) -> Vec<Document> {
        let vector_scores: Vec<f32> = vector_results.iter().map(|entry| entry.score).collect();
        let normalized_vector = tmm_normalize(&vector_scores);

        // Keyword results carry rank order only; synthesize 1/rank scores
        // before normalizing so both sides live on the same scale.
        let keyword_scores = reciprocal_rank_scores(keyword_results.len());
        let normalized_keyword = tmm_normalize(&keyword_scores);

        // Union by stable document id, preserving first-seen order
        // (vector list first) for deterministic tie-breaking.
        let mut candidates: Vec<FusedCandidate> = Vec::new();
        let mut index_by_id: HashMap<String, usize> = HashMap::new();

        for (entry, score) in vector_results.into_iter().zip(normalized_vector) {
            let id = entry.document.stable_id();
            if let Some(&idx) = index_by_id.get(&id) {
                if score > candidates[idx].vector_score {
                    candidates[idx].vector_score = score;
                }
                continue;
            }
            index_by_id.insert(id, candidates.len());
            candidates.push(FusedCandidate {
                document: entry.document,
                vector_score: score,
                keyword_score: 0.0,
            });
        }

        for (document, score) in keyword_results.into_iter().zip(normalized_keyword) {
            let id = document.stable_id();
            match index_by_id.get(&id) {
                Some(&idx) => {
                    if score > candidates[idx].keyword_score {
                        candidates[idx].keyword_score = score;
                    }
                }
                None => {
                    index_by_id.insert(id, candidates.len());
                    candidates.push(FusedCandidate {
                        document,
                        vector_score: 0.0,
                        keyword_score: score,
                    });
                }
            }
        }

        let mut fused: Vec<(Document, f32)> = candidates
            .into_iter()
            .map(|candidate| {
                let score = convex_combine(
                    self.alpha,
                    candidate.vector_score,
                    candidate.keyword_score,
                );
                (candidate.document, score)
            })
            .collect();

        // Stable sort: equal fused scores keep first-seen order.
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        fused.truncate(limit);

        debug!(results = fused.len(), "Hybrid fusion complete");
        fused.into_iter().map(|(document, _)| document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    fn doc(id: &str, content: &str) -> Document {
        let mut metadata = serde_json::Map::new();
        metadata.insert("id".to_owned(), json!(id));
        Document::new(content, metadata)
    }

    struct StubVector {
        results: Vec<ScoredDocument>,
        fail_scored: bool,
        fail_all: bool,
    }

    impl StubVector {
        fn ok(results: Vec<ScoredDocument>) -> Self {
            Self {
                results,
                fail_scored: false,
                fail_all: false,
            }
        }

        fn down() -> Self {
            Self {
                results: Vec::new(),
                fail_scored: true,
                fail_all: true,
            }
        }

        fn scoreless(results: Vec<ScoredDocument>) -> Self {
            Self {
                results,
                fail_scored: true,
                fail_all: false,
            }
        }
    }

    #[async_trait]
    impl VectorSearch for StubVector {
        async fn search_with_scores(
            &self,
            _query: &str,
            k: usize,
        ) -> Result<Vec<ScoredDocument>, AppError> {
            if self.fail_scored {
                return Err(AppError::Provider("scored search down".into()));
            }
            Ok(self.results.iter().take(k).cloned().collect())
        }

        async fn search(&self, _query: &str, k: usize) -> Result<Vec<Document>, AppError> {
            if self.fail_all {
                return Err(AppError::Provider("vector index down".into()));
            }
            Ok(self
                .results
                .iter()
                .take(k)
                .map(|entry| entry.document.clone())
                .collect())
        }
    }

    struct StubKeyword {
        results: Vec<Document>,
        fail: bool,
    }

    impl StubKeyword {
        fn ok(results: Vec<Document>) -> Self {
            Self {
                results,
                fail: false,
            }
        }

        fn down() -> Self {
            Self {
                results: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl KeywordSearch for StubKeyword {
        async fn search(&self, _query: &str) -> Result<Vec<Document>, AppError> {
            if self.fail {
                return Err(AppError::Provider("bm25 down".into()));
            }
            Ok(self.results.clone())
        }
    }

    fn hybrid(vector: StubVector, keyword: StubKeyword, alpha: f32) -> HybridSearch {
        HybridSearch::new(Arc::new(vector), Arc::new(keyword), alpha).unwrap()
    }

    fn ids(documents: &[Document]) -> Vec<String> {
        documents.iter().map(Document::stable_id).collect()
    }

    #[test]
    fn alpha_outside_unit_interval_is_rejected() {
        let build = |alpha| {
            HybridSearch::new(
                Arc::new(StubVector::ok(Vec::new())),
                Arc::new(StubKeyword::ok(Vec::new())),
                alpha,
            )
        };
        assert!(matches!(build(-0.1), Err(AppError::Validation(_))));
        assert!(matches!(build(1.5), Err(AppError::Validation(_))));
        assert!(matches!(build(f32::NAN), Err(AppError::Validation(_))));
        assert!(build(0.0).is_ok());
        assert!(build(1.0).is_ok());
    }

    #[tokio::test]
    async fn alpha_one_reduces_to_pure_vector_ranking() {
        let a = doc("a", "alpha");
        let b = doc("b", "beta");
        let c = doc("c", "gamma");

        let vector = StubVector::ok(vec![
            ScoredDocument::new(c.clone(), 0.9),
            ScoredDocument::new(a.clone(), 0.5),
            ScoredDocument::new(b.clone(), 0.2),
        ]);
        // Same candidate set, opposite order on the keyword side.
        let keyword = StubKeyword::ok(vec![b.clone(), a.clone(), c.clone()]);

        let results = hybrid(vector, keyword, 1.0).search("q", 10).await;
        assert_eq!(ids(&results), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn alpha_zero_reduces_to_pure_keyword_ranking() {
        let a = doc("a", "alpha");
        let b = doc("b", "beta");
        let c = doc("c", "gamma");

        let vector = StubVector::ok(vec![
            ScoredDocument::new(c.clone(), 0.9),
            ScoredDocument::new(a.clone(), 0.5),
            ScoredDocument::new(b.clone(), 0.2),
        ]);
        let keyword = StubKeyword::ok(vec![b.clone(), a.clone(), c.clone()]);

        let results = hybrid(vector, keyword, 0.0).search("q", 10).await;
        assert_eq!(ids(&results), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn fusing_identical_lists_preserves_order_for_any_alpha() {
        let a = doc("a", "alpha");
        let b = doc("b", "beta");
        let c = doc("c", "gamma");

        for alpha in [0.0, 0.3, 0.8, 1.0] {
            let vector = StubVector::ok(vec![
                ScoredDocument::new(a.clone(), 0.9),
                ScoredDocument::new(b.clone(), 0.6),
                ScoredDocument::new(c.clone(), 0.3),
            ]);
            let keyword = StubKeyword::ok(vec![a.clone(), b.clone(), c.clone()]);

            let results = hybrid(vector, keyword, alpha).search("q", 10).await;
            assert_eq!(ids(&results), vec!["a", "b", "c"], "alpha={alpha}");
        }
    }

    #[tokio::test]
    async fn document_in_both_lists_outranks_single_signal_documents() {
        let shared = doc("shared", "in both lists");
        let vector_only = doc("v", "vector only");
        let keyword_only = doc("k", "keyword only");

        let vector = StubVector::ok(vec![
            ScoredDocument::new(vector_only.clone(), 0.95),
            ScoredDocument::new(shared.clone(), 0.9),
        ]);
        let keyword = StubKeyword::ok(vec![shared.clone(), keyword_only.clone()]);

        let results = hybrid(vector, keyword, 0.5).search("q", 10).await;
        assert_eq!(results[0].stable_id(), "shared");
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn vector_failure_falls_back_to_keyword_only() {
        let a = doc("a", "alpha");
        let b = doc("b", "beta");
        let c = doc("c", "gamma");

        let keyword = StubKeyword::ok(vec![a.clone(), b.clone(), c.clone()]);
        let results = hybrid(StubVector::down(), keyword, 0.8).search("q", 2).await;
        assert_eq!(ids(&results), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn keyword_failure_falls_back_to_vector_only() {
        let a = doc("a", "alpha");
        let b = doc("b", "beta");

        let vector = StubVector::ok(vec![
            ScoredDocument::new(b.clone(), 0.7),
            ScoredDocument::new(a.clone(), 0.4),
        ]);
        let results = hybrid(vector, StubKeyword::down(), 0.8).search("q", 10).await;
        assert_eq!(ids(&results), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn both_providers_failing_yields_empty_not_error() {
        let results = hybrid(StubVector::down(), StubKeyword::down(), 0.8)
            .search("q", 10)
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn scoreless_vector_fallback_synthesizes_rank_scores() {
        let a = doc("a", "alpha");
        let b = doc("b", "beta");

        // Scored variant fails, scoreless succeeds: order must survive.
        let vector = StubVector::scoreless(vec![
            ScoredDocument::new(b.clone(), 0.0),
            ScoredDocument::new(a.clone(), 0.0),
        ]);
        let results = hybrid(vector, StubKeyword::down(), 1.0).search("q", 10).await;
        assert_eq!(ids(&results), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn limit_truncates_fused_results() {
        let documents: Vec<ScoredDocument> = (0..8)
            .map(|i| ScoredDocument::new(doc(&format!("d{i}"), "content"), 1.0 - i as f32 * 0.1))
            .collect();
        let vector = StubVector::ok(documents);

        let results = hybrid(vector, StubKeyword::ok(Vec::new()), 0.8)
            .search("q", 3)
            .await;
        assert_eq!(results.len(), 3);
    }
}
