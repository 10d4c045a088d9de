pub mod enrichment;
pub mod fusion;
pub mod keyword;
pub mod pipeline;
pub mod providers;
pub mod reranking;
pub mod resolver;
pub mod scoring;

pub use enrichment::GraphContextSynthesizer;
pub use fusion::HybridSearch;
pub use keyword::Bm25Index;
pub use pipeline::{HybridRetriever, RerankingRetriever, RetrievalConfig, RetrievalPipeline, Retriever};
pub use providers::{InMemoryVectorIndex, KeywordSearch, VectorSearch};
pub use reranking::{RelevanceModel, Reranker, RerankerPool};
pub use resolver::{resolve, EntityKind, ResolvedEntity};
