//! Personal data flow tracing.

use crate::cache::{self, CacheKey};
use crate::domain::EdgeKind;
use crate::graph::traversal;
use crate::graph::ProtocolGraph;
use petgraph::Direction;
use serde::Serialize;

/// An artifact that receives data from the traced node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PiiRecipient {
    /// Receiving URN
    pub urn: String,
    /// Hops from the traced node
    pub depth: usize,
    /// Edge kind through which the data first arrives
    pub via: EdgeKind,
}

/// Result of [`ProtocolGraph::trace_pii_flow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PiiFlowReport {
    /// Traced URN
    pub urn: String,
    /// Whether the URN is in the graph
    pub exists: bool,
    /// Dotted paths of fields flagged as personal data, sorted
    pub pii_fields: Vec<String>,
    /// Downstream artifacts reached over data-carrying edges, by depth then URN
    pub recipients: Vec<PiiRecipient>,
}

impl PiiFlowReport {
    /// Does the node hold personal data that leaves it?
    #[must_use]
    pub fn leaks(&self) -> bool {
        !self.pii_fields.is_empty() && !self.recipients.is_empty()
    }
}

impl ProtocolGraph {
    /// Personal-data fields of a node and every artifact they can reach.
    ///
    /// Only data-carrying edges are followed; `depends_on` is skipped. The
    /// result is cached per `(urn, max_depth)` until the next mutation.
    #[must_use]
    pub fn trace_pii_flow(&self, urn: &str, max_depth: Option<usize>) -> PiiFlowReport {
        let urn = urn.trim();
        let key = CacheKey::PiiFlow {
            urn: urn.to_string(),
            max_depth,
        };
        let report = cache::get_or_compute(self.cache(), key, || self.compute_pii_flow(urn, max_depth));
        (*report).clone()
    }

    fn compute_pii_flow(&self, urn: &str, max_depth: Option<usize>) -> PiiFlowReport {
        let Some(start) = self.index_of(urn) else {
            return PiiFlowReport {
                urn: urn.to_string(),
                exists: false,
                pii_fields: Vec::new(),
                recipients: Vec::new(),
            };
        };
        let arena = self.arena();
        let pii_fields = arena[start].manifest.pii_fields();

        let flow = traversal::bfs_filtered(
            arena,
            start,
            Direction::Outgoing,
            max_depth,
            |kind| kind.carries_data(),
        );
        let mut recipients: Vec<PiiRecipient> = flow
            .reached
            .iter()
            .filter(|r| r.index != start)
            .map(|r| PiiRecipient {
                urn: arena[r.index].urn.clone(),
                depth: r.depth,
                via: r.via,
            })
            .collect();
        recipients.sort_by(|a, b| (a.depth, &a.urn).cmp(&(b.depth, &b.urn)));

        PiiFlowReport {
            urn: urn.to_string(),
            exists: true,
            pii_fields,
            recipients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Manifest, NodeKind};
    use serde_json::{json, Map};

    fn users_manifest() -> Manifest {
        Manifest::new(json!({
            "type": "data",
            "schema": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "email": { "type": "string", "pii": true }
                }
            }
        }))
    }

    fn graph() -> ProtocolGraph {
        let mut graph = ProtocolGraph::new();
        graph
            .add_node("urn:proto:data:acme/users", NodeKind::Data, users_manifest())
            .unwrap();
        for (urn, kind) in [
            ("urn:proto:event:acme/user.created", NodeKind::Event),
            ("urn:proto:api:acme/analytics", NodeKind::Api),
            ("urn:proto:api:acme/audit", NodeKind::Api),
        ] {
            graph.add_node(urn, kind, Manifest::default()).unwrap();
        }
        graph
            .add_edge(
                "urn:proto:data:acme/users",
                EdgeKind::Produces,
                "urn:proto:event:acme/user.created",
                Map::new(),
            )
            .unwrap();
        graph
            .add_edge(
                "urn:proto:event:acme/user.created",
                EdgeKind::WritesTo,
                "urn:proto:api:acme/analytics",
                Map::new(),
            )
            .unwrap();
        graph
            .add_edge(
                "urn:proto:data:acme/users",
                EdgeKind::DependsOn,
                "urn:proto:api:acme/audit",
                Map::new(),
            )
            .unwrap();
        graph
    }

    #[test]
    fn pii_follows_data_edges_only() {
        let report = graph().trace_pii_flow("urn:proto:data:acme/users", None);

        assert!(report.exists);
        assert_eq!(report.pii_fields, vec!["email".to_string()]);
        assert_eq!(
            report.recipients,
            vec![
                PiiRecipient {
                    urn: "urn:proto:event:acme/user.created".to_string(),
                    depth: 1,
                    via: EdgeKind::Produces,
                },
                PiiRecipient {
                    urn: "urn:proto:api:acme/analytics".to_string(),
                    depth: 2,
                    via: EdgeKind::WritesTo,
                },
            ]
        );
        assert!(report.leaks());
    }

    #[test]
    fn depth_bound_limits_recipients() {
        let report = graph().trace_pii_flow("urn:proto:data:acme/users", Some(1));
        assert_eq!(report.recipients.len(), 1);
    }

    #[test]
    fn node_without_pii_does_not_leak() {
        let report = graph().trace_pii_flow("urn:proto:event:acme/user.created", None);
        assert!(report.pii_fields.is_empty());
        assert_eq!(report.recipients.len(), 1);
        assert!(!report.leaks());
    }

    #[test]
    fn unknown_node_reports_absence() {
        let report = graph().trace_pii_flow("urn:proto:data:acme/ghost", None);
        assert!(!report.exists);
        assert!(report.recipients.is_empty());
    }
}
