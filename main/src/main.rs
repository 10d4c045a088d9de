use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use common::{
    document::Document,
    graph::KnowledgeGraph,
    utils::{
        config::{get_config, AppConfig},
        embedding::{EmbeddingBackend, EmbeddingProvider},
    },
};
use retrieval_pipeline::{
    reranking::{RelevanceModel, RerankerPool},
    Bm25Index, InMemoryVectorIndex, RetrievalConfig, RetrievalPipeline,
};

const HASHED_EMBEDDING_DIMENSION: usize = 384;

/// Hybrid graph-RAG retrieval over a travel corpus.
#[derive(Parser, Debug)]
#[command(name = "travel-rag")]
struct Cli {
    /// Query to retrieve documents for.
    query: String,

    /// Override the vector-side fusion weight.
    #[arg(long)]
    alpha: Option<f32>,

    /// Override the per-provider candidate count.
    #[arg(long)]
    top_k: Option<usize>,

    /// Override the returned document count.
    #[arg(long)]
    final_k: Option<usize>,
}

/// One corpus entry as exported by the preprocessing step.
#[derive(Debug, Deserialize)]
struct CorpusEntry {
    content: String,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn load_corpus(path: &Path) -> anyhow::Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path)?;
    let entries: Vec<CorpusEntry> = serde_json::from_str(&raw)?;
    Ok(entries
        .into_iter()
        .map(|entry| Document::new(entry.content, entry.metadata))
        .collect())
}

fn load_graph(config: &AppConfig) -> Option<Arc<KnowledgeGraph>> {
    match KnowledgeGraph::load(Path::new(&config.graph_snapshot_path)) {
        Ok(graph) => Some(Arc::new(graph)),
        Err(err) => {
            warn!(
                path = config.graph_snapshot_path,
                error = %err,
                "Knowledge graph unavailable; answers will lack graph context"
            );
            None
        }
    }
}

async fn embedding_provider(config: &AppConfig) -> anyhow::Result<EmbeddingProvider> {
    match config.embedding_backend.parse::<EmbeddingBackend>()? {
        EmbeddingBackend::FastEmbed => EmbeddingProvider::new_fastembed(None).await,
        EmbeddingBackend::Hashed => Ok(EmbeddingProvider::new_hashed(HASHED_EMBEDDING_DIMENSION)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let mut retrieval = RetrievalConfig::from_app_config(&config)?;
    if let Some(alpha) = cli.alpha {
        retrieval = RetrievalConfig::new(alpha, retrieval.top_k, retrieval.final_k, retrieval.use_reranker)?;
    }
    if let Some(top_k) = cli.top_k {
        retrieval = RetrievalConfig::new(retrieval.alpha, top_k, retrieval.final_k, retrieval.use_reranker)?;
    }
    if let Some(final_k) = cli.final_k {
        retrieval = RetrievalConfig::new(retrieval.alpha, retrieval.top_k, final_k, retrieval.use_reranker)?;
    }

    let documents = load_corpus(Path::new(&config.corpus_path))?;
    info!(documents = documents.len(), "Corpus loaded");

    let embedder = embedding_provider(&config).await?;
    info!(
        backend = embedder.backend_label(),
        dimension = embedder.dimension(),
        "Embedding provider initialized"
    );

    let keyword = Arc::new(Bm25Index::new(documents.clone(), retrieval.top_k));
    let vector = Arc::new(InMemoryVectorIndex::build(embedder, documents).await?);

    let relevance: Option<Arc<dyn RelevanceModel>> = match RerankerPool::maybe_from_config(&config)
    {
        Ok(pool) => pool.map(|pool| pool as Arc<dyn RelevanceModel>),
        Err(err) => {
            warn!(error = %err, "Reranker unavailable; results keep retrieval order");
            None
        }
    };

    let graph = load_graph(&config);

    let pipeline = RetrievalPipeline::assemble(vector, keyword, relevance, graph, &retrieval)?;

    let ranked = pipeline.ranked_documents(&cli.query).await;
    if ranked.is_empty() {
        println!("No documents matched the query.");
        return Ok(());
    }

    for (rank, document) in ranked.iter().enumerate() {
        let preview: String = document.content.chars().take(120).collect();
        println!("{:>2}. [{}] {}", rank + 1, document.stable_id(), preview);
    }

    let context = pipeline.graph_context(&cli.query, &ranked);
    if !context.is_empty() {
        println!("\n--- graph context ---\n{context}");
    }

    Ok(())
}
