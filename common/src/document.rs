use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Retrieval unit handed around by search providers and the fusion engine.
///
/// The metadata map carries whatever the ingestion side attached (source ids,
/// display titles, coordinates). It is loosely typed on purpose: both search
/// providers return documents straight from the indexed corpus and the typed
/// interpretation happens once, in the entity resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// Stable identity used to match the same logical document across the
    /// vector and keyword result lists. Prefers an explicit metadata `id`,
    /// falling back to a digest of the content prefix.
    pub fn stable_id(&self) -> String {
        if let Some(id) = self.metadata_str("id") {
            return id;
        }

        let prefix: String = self.content.chars().take(100).collect();
        let digest = Sha256::digest(prefix.as_bytes());
        format!("{digest:x}")
    }

    /// Fetch a metadata field as text, tolerating the JSON number/string
    /// variance in the source exports.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A document paired with the provider's raw relevance score.
///
/// Raw score semantics are provider specific (similarity vs. distance), so
/// scores from different providers must be normalized before comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

impl ScoredDocument {
    pub fn new(document: Document, score: f32) -> Self {
        Self { document, score }
    }
}
