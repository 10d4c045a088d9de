use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::debug;

use common::{document::Document, error::AppError};

use crate::providers::KeywordSearch;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// In-memory BM25 index over a fixed document collection.
///
/// Built once at startup next to the vector index; the result-count
/// ceiling is fixed at construction per the provider contract.
pub struct Bm25Index {
    documents: Vec<Document>,
    doc_tokens: Vec<Vec<String>>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f32,
    limit: usize,
}

impl Bm25Index {
    pub fn new(documents: Vec<Document>, limit: usize) -> Self {
        let doc_tokens: Vec<Vec<String>> = documents
            .iter()
            .map(|doc| tokenize(&doc.content))
            .collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &doc_tokens {
            let unique: HashSet<&String> = tokens.iter().collect();
            for token in unique {
                *doc_freq.entry(token.clone()).or_insert(0) += 1;
            }
        }

        let total_len: usize = doc_tokens.iter().map(Vec::len).sum();
        let avg_doc_len = if doc_tokens.is_empty() {
            0.0
        } else {
            total_len as f32 / doc_tokens.len() as f32
        };

        debug!(
            documents = documents.len(),
            vocabulary = doc_freq.len(),
            limit,
            "Built BM25 keyword index"
        );

        Self {
            documents,
            doc_tokens,
            doc_freq,
            avg_doc_len,
            limit,
        }
    }

    fn score(&self, query_tokens: &[String], doc_idx: usize) -> f32 {
        let tokens = &self.doc_tokens[doc_idx];
        if tokens.is_empty() {
            return 0.0;
        }

        let mut term_freq: HashMap<&String, usize> = HashMap::new();
        for token in tokens {
            *term_freq.entry(token).or_insert(0) += 1;
        }

        let doc_len = tokens.len() as f32;
        let total_docs = self.documents.len() as f32;

        let mut score = 0.0;
        for term in query_tokens {
            let Some(&df) = self.doc_freq.get(term) else {
                continue;
            };
            let Some(&tf) = term_freq.get(term) else {
                continue;
            };

            let idf = (1.0 + (total_docs - df as f32 + 0.5) / (df as f32 + 0.5)).ln();
            let tf = tf as f32;
            let denominator = tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_len.max(1.0));
            score += idf * (tf * (K1 + 1.0)) / denominator;
        }
        score
    }

    fn ranked(&self, query: &str) -> Vec<Document> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = (0..self.documents.len())
            .map(|idx| (idx, self.score(&query_tokens, idx)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.limit);

        scored
            .into_iter()
            .map(|(idx, _)| self.documents[idx].clone())
            .collect()
    }
}

#[async_trait]
impl KeywordSearch for Bm25Index {
    async fn search(&self, query: &str) -> Result<Vec<Document>, AppError> {
        Ok(self.ranked(query))
    }
}

/// Unicode-aware tokenization: lowercase, split on anything that is not a
/// letter or digit. Keeps Hangul intact.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}
