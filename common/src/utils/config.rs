use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_graph_snapshot_path")]
    pub graph_snapshot_path: String,
    #[serde(default = "default_corpus_path")]
    pub corpus_path: String,
    /// Weight of the vector side in the convex combination; the keyword
    /// side gets `1 - alpha`.
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f32,
    /// Candidate count requested from each search provider.
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,
    /// Documents returned to the caller after fusion and re-ranking.
    #[serde(default = "default_final_k")]
    pub final_k: usize,
    #[serde(default)]
    pub reranking_enabled: bool,
    pub reranking_pool_size: Option<usize>,
    pub fastembed_cache_dir: Option<String>,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: String,
}

fn default_graph_snapshot_path() -> String {
    "./data/knowledge_graph.json".to_string()
}

fn default_corpus_path() -> String {
    "./data/corpus.json".to_string()
}

fn default_hybrid_alpha() -> f32 {
    0.8
}

fn default_search_top_k() -> usize {
    20
}

fn default_final_k() -> usize {
    5
}

fn default_embedding_backend() -> String {
    "hashed".to_string()
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
