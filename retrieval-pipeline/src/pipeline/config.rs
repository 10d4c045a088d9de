use serde::{Deserialize, Serialize};

use common::{error::AppError, utils::config::AppConfig};

/// Tunable parameters that govern each retrieval stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Vector-side weight of the hybrid convex combination.
    pub alpha: f32,
    /// Candidate count requested from each first-pass provider.
    pub top_k: usize,
    /// Document count kept after the optional rerank stage.
    pub final_k: usize,
    pub use_reranker: bool,
}

impl RetrievalConfig {
    pub fn new(alpha: f32, top_k: usize, final_k: usize, use_reranker: bool) -> Result<Self, AppError> {
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(AppError::Validation(format!(
                "retrieval alpha must be within [0, 1], got {alpha}"
            )));
        }
        if top_k == 0 {
            return Err(AppError::Validation(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if final_k == 0 {
            return Err(AppError::Validation(
                "final_k must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            alpha,
            top_k,
            final_k,
            use_reranker,
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.hybrid_alpha,
            config.search_top_k,
            config.final_k,
            config.reranking_enabled,
        )
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: 0.8,
            top_k: 20,
            final_k: 5,
            use_reranker: false,
        }
    }
}
