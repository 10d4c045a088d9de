use std::{
    env, fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::available_parallelism,
};

use async_trait::async_trait;
use fastembed::{RerankInitOptions, TextRerank};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use common::{document::Document, error::AppError, utils::config::AppConfig};

static NEXT_ENGINE: AtomicUsize = AtomicUsize::new(0);

fn pick_engine_index(pool_len: usize) -> usize {
    let n = NEXT_ENGINE.fetch_add(1, Ordering::Relaxed);
    n % pool_len
}

/// Scores a batch of passages against a query. Output is aligned with
/// the input: `scores[i]` belongs to `passages[i]`.
#[async_trait]
pub trait RelevanceModel: Send + Sync {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, AppError>;
}

pub struct RerankerPool {
    engines: Vec<Arc<Mutex<TextRerank>>>,
    semaphore: Arc<Semaphore>,
}

impl RerankerPool {
    /// Build the pool at startup.
    /// `pool_size` controls max parallel reranks.
    pub fn new(pool_size: usize) -> Result<Arc<Self>, AppError> {
        Self::new_with_options(pool_size, RerankInitOptions::default())
    }

    fn new_with_options(
        pool_size: usize,
        init_options: RerankInitOptions,
    ) -> Result<Arc<Self>, AppError> {
        if pool_size == 0 {
            return Err(AppError::Validation(
                "RERANKING_POOL_SIZE must be greater than zero".to_string(),
            ));
        }

        fs::create_dir_all(&init_options.cache_dir)?;

        let mut engines = Vec::with_capacity(pool_size);
        for x in 0..pool_size {
            debug!("Creating reranking engine: {x}");
            let model = TextRerank::try_new(init_options.clone())
                .map_err(|e| AppError::InternalError(e.to_string()))?;
            engines.push(Arc::new(Mutex::new(model)));
        }

        Ok(Arc::new(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }))
    }

    /// Initialize a pool using application configuration.
    pub fn maybe_from_config(config: &AppConfig) -> Result<Option<Arc<Self>>, AppError> {
        if !config.reranking_enabled {
            return Ok(None);
        }

        let pool_size = config.reranking_pool_size.unwrap_or_else(default_pool_size);

        let init_options = build_rerank_init_options(config)?;
        Self::new_with_options(pool_size, init_options).map(Some)
    }

    /// Check out capacity + pick an engine.
    /// This returns a lease that can perform rerank().
    async fn checkout(&self) -> Result<RerankerLease, AppError> {
        // Acquire a permit. This enforces backpressure.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::InternalError("reranker pool closed".to_string()))?;

        // Pick an engine with a simple modulo counter so we do not
        // always contend on index 0.
        let idx = pick_engine_index(self.engines.len());
        let engine = self.engines[idx].clone();

        Ok(RerankerLease {
            _permit: permit,
            engine,
        })
    }
}

#[async_trait]
impl RelevanceModel for RerankerPool {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, AppError> {
        let lease = self.checkout().await?;
        let results = lease.rerank(query, passages.to_vec()).await?;

        // fastembed returns results sorted by relevance; realign them
        // onto the caller's input positions.
        let mut scores = vec![0.0f32; passages.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }
}

fn default_pool_size() -> usize {
    available_parallelism()
        .map(|value| value.get().min(2))
        .unwrap_or(2)
        .max(1)
}

fn build_rerank_init_options(config: &AppConfig) -> Result<RerankInitOptions, AppError> {
    let mut options = RerankInitOptions::default();

    let cache_dir = config
        .fastembed_cache_dir
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| env::var("FASTEMBED_CACHE_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(".fastembed_cache").join("reranker"));
    fs::create_dir_all(&cache_dir)?;
    options.cache_dir = cache_dir;

    Ok(options)
}

/// Active lease on a single TextRerank instance.
struct RerankerLease {
    // When this drops the semaphore permit is released.
    _permit: OwnedSemaphorePermit,
    engine: Arc<Mutex<TextRerank>>,
}

impl RerankerLease {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<String>,
    ) -> Result<Vec<fastembed::RerankResult>, AppError> {
        // Lock this specific engine so we get &mut TextRerank
        let mut guard = self.engine.lock().await;

        guard
            .rerank(query.to_owned(), documents, false, None)
            .map_err(|e| AppError::InternalError(e.to_string()))
    }
}

/// Re-sorts retrieved documents by cross-encoder relevance.
///
/// The model is optional: without one, or when scoring fails, the input
/// order passes through untouched. Reordering is a pure re-sort, the
/// upstream fusion scores are not blended back in.
pub struct Reranker {
    model: Option<Arc<dyn RelevanceModel>>,
    keep_top: usize,
}

impl Reranker {
    pub fn new(model: Option<Arc<dyn RelevanceModel>>, keep_top: usize) -> Self {
        Self { model, keep_top }
    }

    pub async fn rerank(&self, query: &str, documents: Vec<Document>) -> Vec<Document> {
        if documents.is_empty() {
            return documents;
        }

        let Some(model) = &self.model else {
            let mut documents = documents;
            documents.truncate(self.keep_top);
            return documents;
        };

        let passages: Vec<String> = documents
            .iter()
            .map(|document| document.content.clone())
            .collect();

        match model.score(query, &passages).await {
            Ok(scores) if scores.len() == documents.len() => {
                let mut scored: Vec<(Document, f32)> =
                    documents.into_iter().zip(scores).collect();
                scored.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                });
                scored.truncate(self.keep_top);
                debug!(results = scored.len(), "Reranking complete");
                scored.into_iter().map(|(document, _)| document).collect()
            }
            Ok(scores) => {
                warn!(
                    expected = documents.len(),
                    got = scores.len(),
                    "Relevance model returned misaligned scores; keeping retrieval order"
                );
                let mut documents = documents;
                documents.truncate(self.keep_top);
                documents
            }
            Err(err) => {
                warn!(error = %err, "Reranking failed; keeping retrieval order");
                let mut documents = documents;
                documents.truncate(self.keep_top);
                documents
            }
        }
    }
}
