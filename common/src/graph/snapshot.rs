use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::AppError;

use super::{GraphEdge, GraphNode, KnowledgeGraph};

/// On-disk form of the knowledge graph: one JSON blob with every node and
/// edge, produced by the (external) graph-construction ETL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl KnowledgeGraph {
    /// Rebuild the graph from its serialized form, enforcing node id
    /// uniqueness and edge endpoint integrity.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, AppError> {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            graph
                .insert_node(node)
                .map_err(|e| AppError::GraphSnapshot(e.to_string()))?;
        }
        for edge in snapshot.edges {
            graph
                .insert_edge(edge)
                .map_err(|e| AppError::GraphSnapshot(e.to_string()))?;
        }
        Ok(graph)
    }

    /// Serialized form with deterministic ordering, so repeated saves of
    /// the same graph are byte-identical.
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<GraphNode> = self.nodes().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<GraphEdge> = self.edges().cloned().collect();
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));

        GraphSnapshot { nodes, edges }
    }

    /// Load the graph snapshot from disk. Called once at startup; failures
    /// are logged here at error severity and surfaced so the caller can
    /// decide to run without enrichment.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to read knowledge graph snapshot");
            AppError::GraphSnapshot(format!("reading '{}': {e}", path.display()))
        })?;

        let snapshot: GraphSnapshot = serde_json::from_str(&raw).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to decode knowledge graph snapshot");
            AppError::GraphSnapshot(format!("decoding '{}': {e}", path.display()))
        })?;

        let graph = Self::from_snapshot(snapshot)?;
        info!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Knowledge graph snapshot loaded"
        );
        Ok(graph)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let serialized = serde_json::to_string_pretty(&self.to_snapshot())?;
        fs::write(path, serialized)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, NodeKind};
    use serde_json::json;

    fn sample_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph
            .insert_node(
                GraphNode::new("attraction_26", NodeKind::Attraction, "해운대해수욕장")
                    .with_attr("address", json!("부산광역시 해운대구"))
                    .with_attr("description", json!("부산의 대표적인 여름 피서지")),
            )
            .unwrap();
        graph
            .insert_node(GraphNode::new("area_해운대구", NodeKind::Area, "해운대구"))
            .unwrap();
        graph
            .insert_edge(GraphEdge::new(
                "attraction_26",
                "area_해운대구",
                EdgeKind::LocatedIn,
            ))
            .unwrap();
        graph
    }

    #[test]
    fn snapshot_round_trips_nodes_and_edges() {
        let graph = sample_graph();
        let rebuilt = KnowledgeGraph::from_snapshot(graph.to_snapshot()).unwrap();

        assert_eq!(rebuilt.node_count(), graph.node_count());
        assert_eq!(rebuilt.edge_count(), graph.edge_count());

        let node = rebuilt.node("attraction_26").unwrap();
        assert_eq!(node.name, "해운대해수욕장");
        assert_eq!(node.attr_text("address").as_deref(), Some("부산광역시 해운대구"));

        let edges = rebuilt.outgoing("attraction_26");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::LocatedIn);
        assert_eq!(edges[0].target, "area_해운대구");
    }

    #[test]
    fn snapshot_survives_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge_graph.json");

        let graph = sample_graph();
        graph.save(&path).unwrap();

        let loaded = KnowledgeGraph::load(&path).unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.edge_count(), 1);
        assert!(loaded.has_node("area_해운대구"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = KnowledgeGraph::load(Path::new("/nonexistent/graph.json"));
        assert!(matches!(err, Err(AppError::GraphSnapshot(_))));
    }

    #[test]
    fn edge_kind_serializes_to_fixed_vocabulary() {
        let edge = GraphEdge::new("a", "b", EdgeKind::NearbyLandmark).with_attr("distance", json!(120.0));
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["type"], "NEARBY_LANDMARK");
        assert_eq!(value["distance"], 120.0);
    }
}
