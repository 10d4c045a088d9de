use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use common::{
    document::Document,
    graph::{EdgeKind, GraphEdge, KnowledgeGraph, NodeKind},
};

use crate::resolver;

const DESCRIPTION_PREVIEW_CHARS: usize = 100;

/// Builds prompt-injection context from the knowledge graph for a set of
/// retrieved documents. Enrichment is best-effort: without a loaded
/// graph, or when nothing resolves, the context is simply empty.
pub struct GraphContextSynthesizer {
    graph: Option<Arc<KnowledgeGraph>>,
}

enum NodeContext {
    Missing,
    /// Node exists but has nothing beyond its header line.
    Bare,
    Block(String),
}

impl GraphContextSynthesizer {
    pub fn new(graph: Option<Arc<KnowledgeGraph>>) -> Self {
        Self { graph }
    }

    pub fn context_for_documents(&self, query: &str, documents: &[Document]) -> String {
        let Some(graph) = &self.graph else {
            warn!("Knowledge graph not loaded; skipping context enrichment");
            return String::new();
        };

        let entities: Vec<resolver::ResolvedEntity> =
            documents.iter().filter_map(resolver::resolve).collect();
        if entities.is_empty() {
            debug!(query, "No documents resolved to graph entities");
            return String::new();
        }

        let mut blocks: Vec<String> = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();

        for entity in entities {
            let node_id = entity.node_id();
            if !processed.insert(node_id.clone()) {
                continue;
            }
            match render_node(graph, &node_id) {
                NodeContext::Block(block) => blocks.push(block),
                NodeContext::Bare => {
                    debug!(node_id, "Graph node carries no additional information");
                }
                NodeContext::Missing => {
                    debug!(
                        node_id,
                        name = entity.name,
                        "Resolved entity has no matching graph node"
                    );
                }
            }
        }

        let context = blocks.join("\n\n");
        if !context.is_empty() {
            debug!(
                query,
                blocks = processed.len(),
                chars = context.len(),
                "Graph context synthesized"
            );
        }
        context
    }
}

fn render_node(graph: &KnowledgeGraph, node_id: &str) -> NodeContext {
    let Some(node) = graph.node(node_id) else {
        return NodeContext::Missing;
    };

    let mut lines = vec![format!("['{}' ({}) additional information]", node.name, node.kind)];

    for edge in graph.outgoing(node_id) {
        let Some(neighbor) = graph.node(&edge.target) else {
            continue;
        };
        let line = match edge.kind {
            EdgeKind::LocatedIn => {
                format!("  - location: {} ({})", neighbor.name, neighbor.kind)
            }
            EdgeKind::ServesMenu => {
                let description = neighbor
                    .attr_text("description")
                    .map(|text| format!(" [{text}]"))
                    .unwrap_or_default();
                let price = edge_attr_text(edge, "price")
                    .map(|text| format!(" (price: {text})"))
                    .unwrap_or_default();
                format!("  - key menu item: {}{description}{price}", neighbor.name)
            }
            EdgeKind::HasFeature => format!("  - feature: {}", neighbor.name),
            EdgeKind::NearbyLandmark => {
                let distance = edge
                    .attr_f64("distance")
                    .map(|meters| format!(" (distance: ~{meters:.0}m)"))
                    .unwrap_or_default();
                format!("  - nearby: {}{distance}", neighbor.name)
            }
        };
        lines.push(line);
    }

    match node.kind {
        NodeKind::Attraction => {
            if let Some(description) = node.attr_text("description") {
                lines.push(format!("  - description: {}", preview(&description)));
            }
            if let Some(contact) = node.attr_text("contact") {
                lines.push(format!("  - contact: {contact}"));
            }
            if let Some(transit) = node.attr_text("traffic_info") {
                lines.push(format!("  - transit: {transit}"));
            }
        }
        NodeKind::Restaurant => {
            if let Some(description) = node.attr_text("description") {
                lines.push(format!("  - description: {}", preview(&description)));
            }
            if let Some(hours) = node.attr_text("hours") {
                lines.push(format!("  - hours: {hours}"));
            }
            if let Some(closed) = node.attr_text("closed_days") {
                lines.push(format!("  - closed: {closed}"));
            }
        }
        _ => {}
    }

    if lines.len() == 1 {
        NodeContext::Bare
    } else {
        NodeContext::Block(lines.join("\n"))
    }
}

/// Edge attribute as display text, dropping empty and "nan" placeholders
/// left over from the source exports.
fn edge_attr_text(edge: &GraphEdge, key: &str) -> Option<String> {
    match edge.attrs.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("nan"))
                .then(|| trimmed.to_owned())
        }
        Value::Number(n) => {
            let value = n.as_f64()?;
            value.is_finite().then(|| n.to_string())
        }
        _ => None,
    }
}

fn preview(text: &str) -> String {
    let truncated: String = text.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
    if truncated.chars().count() < text.chars().count() {
        format!("{truncated}...")
    } else {
        truncated
    }
}
