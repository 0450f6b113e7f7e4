//! Full-graph snapshot serialization.
//!
//! Snapshots are used by tests and by governance report generation; they
//! are not an incremental log. Kinds are kept as plain strings so that a
//! snapshot with an unknown kind fails with the same [`Error`] as fresh
//! ingestion would, rather than as a deserialization error.

use super::ProtocolGraph;
use crate::domain::{EdgeKind, Manifest, NodeKind};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

/// A node entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node URN
    pub urn: String,
    /// Node kind in wire spelling
    pub kind: String,
    /// Node manifest
    #[serde(default)]
    pub manifest: Manifest,
}

/// An edge entry of a snapshot. Metadata keys sit beside the fixed fields,
/// which is why `from`, `to` and `kind` are rejected as metadata keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Source URN
    pub from: String,
    /// Target URN
    pub to: String,
    /// Edge kind in wire spelling
    pub kind: String,
    /// Free-form metadata
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// A complete graph snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Every node, sorted by URN
    pub nodes: Vec<NodeRecord>,
    /// Every edge, sorted by source, target and kind
    pub edges: Vec<EdgeRecord>,
}

impl ProtocolGraph {
    /// Capture the whole graph.
    #[must_use]
    pub fn to_json(&self) -> GraphSnapshot {
        let mut nodes: Vec<NodeRecord> = self
            .nodes()
            .map(|node| NodeRecord {
                urn: node.urn.clone(),
                kind: node.kind.to_string(),
                manifest: node.manifest.clone(),
            })
            .collect();
        nodes.sort_by(|a, b| a.urn.cmp(&b.urn));

        let edges = nodes
            .iter()
            .flat_map(|node| self.get_out_edges(&node.urn))
            .map(|edge| EdgeRecord {
                from: edge.from,
                to: edge.to,
                kind: edge.kind.to_string(),
                metadata: edge.metadata,
            })
            .collect();

        GraphSnapshot { nodes, edges }
    }

    /// Replace the graph with the contents of a snapshot.
    ///
    /// Every entry goes through [`add_node`](Self::add_node) and
    /// [`add_edge`](Self::add_edge) validation. The snapshot is loaded into
    /// a fresh graph first, so on error `self` is left untouched.
    ///
    /// # Errors
    ///
    /// The first validation error encountered.
    pub fn from_json(&mut self, snapshot: &GraphSnapshot) -> Result<()> {
        let mut fresh = ProtocolGraph::with_config(self.config().clone());

        for node in &snapshot.nodes {
            let kind: NodeKind = node.kind.parse()?;
            fresh.add_node(&node.urn, kind, node.manifest.clone())?;
        }
        for edge in &snapshot.edges {
            let kind: EdgeKind = edge.kind.parse()?;
            fresh.add_edge(&edge.from, kind, &edge.to, edge.metadata.clone())?;
        }

        self.graph = fresh.graph;
        self.node_map = fresh.node_map;
        self.indices = fresh.indices;
        self.invalidate();
        info!(
            nodes = self.node_count(),
            edges = self.edge_count(),
            "graph reloaded from snapshot"
        );
        Ok(())
    }

    /// Serialize the snapshot to a JSON string.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    /// Parse a JSON snapshot and load it with [`from_json`](Self::from_json).
    ///
    /// # Errors
    ///
    /// [`Error::Json`] for malformed JSON, otherwise as `from_json`.
    pub fn from_json_str(&mut self, content: &str) -> Result<()> {
        let snapshot: GraphSnapshot = serde_json::from_str(content).map_err(Error::from)?;
        self.from_json(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ProtocolGraph {
        let mut graph = ProtocolGraph::new();
        graph
            .add_node(
                "urn:proto:api:acme/orders@1.0.0",
                NodeKind::Api,
                Manifest::new(json!({ "type": "api" })),
            )
            .unwrap();
        graph
            .add_node("urn:proto:data:acme/users@1.0.0", NodeKind::Data, Manifest::default())
            .unwrap();
        let mut metadata = Map::new();
        metadata.insert("optional".to_string(), Value::Bool(true));
        graph
            .add_edge(
                "urn:proto:api:acme/orders@1.0.0",
                EdgeKind::ReadsFrom,
                "urn:proto:data:acme/users@1.0.0",
                metadata,
            )
            .unwrap();
        graph
    }

    #[test]
    fn snapshot_flattens_edge_metadata() {
        let json = serde_json::to_value(sample().to_json()).unwrap();

        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        let edge = &json["edges"][0];
        assert_eq!(edge["kind"], "reads_from");
        assert_eq!(edge["optional"], true);
        assert_eq!(edge["from"], "urn:proto:api:acme/orders@1.0.0");
    }

    #[test]
    fn reload_reproduces_graph() {
        let original = sample();
        let text = original.to_json_string().unwrap();

        let mut restored = ProtocolGraph::new();
        restored.from_json_str(&text).unwrap();

        assert_eq!(restored.to_json(), original.to_json());
        assert_eq!(restored.get_stats(), original.get_stats());
    }

    #[test]
    fn invalid_kind_fails_like_ingestion_and_leaves_graph_intact() {
        let mut graph = sample();
        let mut snapshot = graph.to_json();
        snapshot.nodes[0].kind = "spaceship".to_string();

        let err = graph.from_json(&snapshot).unwrap_err();
        assert!(matches!(err, Error::InvalidKind(_)));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn dangling_edge_fails_with_unknown_node() {
        let mut graph = ProtocolGraph::new();
        let snapshot = GraphSnapshot {
            nodes: vec![],
            edges: vec![EdgeRecord {
                from: "urn:proto:api:acme/a".to_string(),
                to: "urn:proto:api:acme/b".to_string(),
                kind: "depends_on".to_string(),
                metadata: Map::new(),
            }],
        };
        assert!(matches!(
            graph.from_json(&snapshot),
            Err(Error::UnknownNode { .. })
        ));
    }

    #[test]
    fn edge_metadata_cannot_shadow_fixed_fields() {
        let mut graph = sample();
        let mut metadata = Map::new();
        metadata.insert("kind".to_string(), json!("sync"));
        let err = graph
            .add_edge(
                "urn:proto:data:acme/users@1.0.0",
                EdgeKind::DependsOn,
                "urn:proto:api:acme/orders@1.0.0",
                metadata.clone(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ReservedMetadataKey(_)));

        let text = graph.to_json_string().unwrap();
        let mut restored = ProtocolGraph::new();
        restored.from_json_str(&text).unwrap();
        assert_eq!(restored.to_json(), graph.to_json());

        let mut snapshot = graph.to_json();
        snapshot.edges[0].metadata = metadata;
        assert!(matches!(
            restored.from_json(&snapshot),
            Err(Error::ReservedMetadataKey(key)) if key == "kind"
        ));
        assert_eq!(restored.edge_count(), 1);
    }

    #[test]
    fn malformed_json_is_reported() {
        let mut graph = ProtocolGraph::new();
        assert!(matches!(graph.from_json_str("{ nope"), Err(Error::Json(_))));
    }
}
