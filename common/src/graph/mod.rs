pub mod snapshot;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Node vocabulary of the travel knowledge graph. Attractions and
/// restaurants are the primary entities; the rest are auxiliary nodes
/// hanging off them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Attraction,
    Restaurant,
    Area,
    Menu,
    Landmark,
    Feature,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeKind::Attraction => "Attraction",
            NodeKind::Restaurant => "Restaurant",
            NodeKind::Area => "Area",
            NodeKind::Menu => "Menu",
            NodeKind::Landmark => "Landmark",
            NodeKind::Feature => "Feature",
        };
        f.write_str(label)
    }
}

/// Typed, directed relationship vocabulary. Fixed: the graph builder only
/// ever emits these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    LocatedIn,
    ServesMenu,
    NearbyLandmark,
    HasFeature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    /// Remaining descriptive fields (address, description, hours, ...).
    /// Kept as a raw map so the snapshot round-trips exactly; missing
    /// fields stay absent rather than null.
    #[serde(default, flatten)]
    pub attrs: Map<String, Value>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            attrs: Map::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: Value) -> Self {
        self.attrs.insert(key.to_owned(), value);
        self
    }

    /// Attribute as non-empty text, tolerating numeric values.
    pub fn attr_text(&self, key: &str) -> Option<String> {
        match self.attrs.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    /// Edge payload (`price` on SERVES_MENU, `distance` on NEARBY_LANDMARK).
    #[serde(default, flatten)]
    pub attrs: Map<String, Value>,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            attrs: Map::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: Value) -> Self {
        self.attrs.insert(key.to_owned(), value);
        self
    }

    /// Attribute as a finite float, tolerating numeric strings. Returns
    /// None for missing values and for "nan"-style placeholders left over
    /// from the source exports.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        let value = match self.attrs.get(key)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// In-memory directed property graph over the city's places.
///
/// Loaded once from a snapshot and read-only afterwards; shared across
/// in-flight requests behind an `Arc` with no further synchronization.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, GraphNode>,
    out_edges: HashMap<String, Vec<GraphEdge>>,
    edge_count: usize,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, rejecting duplicate ids. Ids are content-addressed
    /// by kind + source id/name, so a duplicate means two distinct
    /// real-world entities collided during graph construction.
    pub fn insert_node(&mut self, node: GraphNode) -> Result<(), AppError> {
        if node.id.is_empty() {
            return Err(AppError::Validation("graph node id must not be empty".into()));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(AppError::Validation(format!(
                "duplicate graph node id '{}'",
                node.id
            )));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Insert a directed edge. Both endpoints must already exist.
    pub fn insert_edge(&mut self, edge: GraphEdge) -> Result<(), AppError> {
        if !self.nodes.contains_key(&edge.source) {
            return Err(AppError::Validation(format!(
                "edge source '{}' is not a known node",
                edge.source
            )));
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(AppError::Validation(format!(
                "edge target '{}' is not a known node",
                edge.target
            )));
        }
        self.out_edges
            .entry(edge.source.clone())
            .or_default()
            .push(edge);
        self.edge_count = self.edge_count.saturating_add(1);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn outgoing(&self, id: &str) -> &[GraphEdge] {
        self.out_edges.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub(crate) fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.out_edges.values().flatten()
    }
}

/// Normalization applied to auxiliary entity names before they become node
/// ids: trim, lowercase, drop whitespace and punctuation while keeping
/// letters and digits from any script (Hangul included).
pub fn normalize_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Node id for a primary attraction entity.
pub fn attraction_node_id(source_id: &str) -> String {
    format!("attraction_{}", source_id.trim())
}

/// Node id for a primary restaurant entity. The graph builder stores the
/// numeric id after an int coercion, so "1241.0" and "1241" must land on
/// the same node. A non-numeric id falls back to the raw string; lookup
/// will then simply miss.
pub fn restaurant_node_id(source_id: &str) -> String {
    let trimmed = source_id.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => format!("restaurant_{}", value as i64),
        _ => format!("restaurant_{trimmed}"),
    }
}

/// Node id for an auxiliary entity (area, menu, landmark, feature), keyed
/// by its normalized name. None when the name normalizes to nothing.
pub fn auxiliary_node_id(kind: NodeKind, raw_name: &str) -> Option<String> {
    let prefix = match kind {
        NodeKind::Area => "area",
        NodeKind::Menu => "menu",
        NodeKind::Landmark => "landmark",
        NodeKind::Feature => "feature",
        NodeKind::Attraction | NodeKind::Restaurant => return None,
    };
    let normalized = normalize_name(raw_name);
    (!normalized.is_empty()).then(|| format!("{prefix}_{normalized}"))
}
