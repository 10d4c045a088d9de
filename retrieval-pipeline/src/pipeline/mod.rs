mod config;

pub use config::RetrievalConfig;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use common::{document::Document, error::AppError, graph::KnowledgeGraph};

use crate::{
    enrichment::GraphContextSynthesizer,
    fusion::HybridSearch,
    providers::{KeywordSearch, VectorSearch},
    reranking::{RelevanceModel, Reranker},
};

/// One retrieval stage. Stages absorb provider failures internally, so
/// `retrieve` degrades to fewer (possibly zero) documents instead of
/// erroring; construction is where invalid parameters are rejected.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Vec<Document>;
}

/// First-pass stage: hybrid vector + keyword fusion.
pub struct HybridRetriever {
    search: HybridSearch,
    top_k: usize,
}

impl HybridRetriever {
    pub fn new(
        vector: Arc<dyn VectorSearch>,
        keyword: Arc<dyn KeywordSearch>,
        config: &RetrievalConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            search: HybridSearch::new(vector, keyword, config.alpha)?,
            top_k: config.top_k,
        })
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &str) -> Vec<Document> {
        let started = Instant::now();
        let documents = self.search.search(query, self.top_k).await;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            results = documents.len(),
            "Hybrid retrieval stage finished"
        );
        documents
    }
}

/// Decorator stage: re-sorts an inner retriever's output with a
/// cross-encoder, passing the order through untouched when no model is
/// available or scoring fails.
pub struct RerankingRetriever<R: Retriever> {
    inner: R,
    reranker: Reranker,
}

impl<R: Retriever> RerankingRetriever<R> {
    pub fn new(inner: R, model: Option<Arc<dyn RelevanceModel>>, keep_top: usize) -> Self {
        Self {
            inner,
            reranker: Reranker::new(model, keep_top),
        }
    }
}

#[async_trait]
impl<R: Retriever> Retriever for RerankingRetriever<R> {
    async fn retrieve(&self, query: &str) -> Vec<Document> {
        let documents = self.inner.retrieve(query).await;
        let started = Instant::now();
        let documents = self.reranker.rerank(query, documents).await;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            results = documents.len(),
            "Reranking stage finished"
        );
        documents
    }
}

/// The assembled retrieval core: a stage chain plus graph enrichment.
///
/// Both entry points are pure in their inputs given the immutable loaded
/// graph and indices: no hidden state changes their output for a fixed
/// snapshot.
pub struct RetrievalPipeline {
    retriever: Box<dyn Retriever>,
    synthesizer: GraphContextSynthesizer,
    final_k: usize,
}

impl RetrievalPipeline {
    pub fn new(
        retriever: Box<dyn Retriever>,
        graph: Option<Arc<KnowledgeGraph>>,
        final_k: usize,
    ) -> Self {
        Self {
            retriever,
            synthesizer: GraphContextSynthesizer::new(graph),
            final_k,
        }
    }

    /// Wires the standard stage chain from providers and configuration.
    pub fn assemble(
        vector: Arc<dyn VectorSearch>,
        keyword: Arc<dyn KeywordSearch>,
        relevance: Option<Arc<dyn RelevanceModel>>,
        graph: Option<Arc<KnowledgeGraph>>,
        config: &RetrievalConfig,
    ) -> Result<Self, AppError> {
        let hybrid = HybridRetriever::new(vector, keyword, config)?;
        let retriever: Box<dyn Retriever> = if config.use_reranker {
            Box::new(RerankingRetriever::new(hybrid, relevance, config.final_k))
        } else {
            Box::new(hybrid)
        };
        Ok(Self::new(retriever, graph, config.final_k))
    }

    /// Up to `final_k` documents ranked for the query. Provider failures
    /// surface as fewer results, never as an error.
    #[instrument(skip(self))]
    pub async fn ranked_documents(&self, query: &str) -> Vec<Document> {
        let started = Instant::now();
        let mut documents = self.retriever.retrieve(query).await;
        documents.truncate(self.final_k);
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            results = documents.len(),
            "Retrieval pipeline finished"
        );
        documents
    }

    /// Graph-side enrichment text for already-retrieved documents; empty
    /// when nothing resolves or the graph is absent.
    pub fn graph_context(&self, query: &str, documents: &[Document]) -> String {
        self.synthesizer.context_for_documents(query, documents)
    }
}
