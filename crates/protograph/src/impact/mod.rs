//! Change impact analysis.
//!
//! Answers "what is affected if this artifact changes?" in three layers:
//!
//! - [`ProtocolGraph::analyze_impact`]: direct and transitive dependents
//!   (downstream) and dependencies (upstream)
//! - [`ProtocolGraph::analyze_detailed_impact`]: the same sets grouped by
//!   the edge kind through which each artifact is reached
//! - [`ProtocolGraph::calculate_structural_risk`]: a topology-only score of
//!   the blast radius
//!
//! Unknown URNs are a valid question with a valid answer: every result type
//! carries `exists: false` instead of an error.

mod pii;

pub use pii::{PiiFlowReport, PiiRecipient};

use crate::cache::{self, CacheKey};
use crate::domain::{EdgeInfo, EdgeKind};
use crate::graph::traversal::{self, Traversal};
use crate::graph::ProtocolGraph;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Points for each direct dependent, up to [`DIRECT_CAP`].
const DIRECT_WEIGHT: usize = 10;
/// Maximum contribution of direct dependents.
const DIRECT_CAP: usize = 40;
/// Points for each transitive dependent, up to [`TRANSITIVE_CAP`].
const TRANSITIVE_WEIGHT: usize = 2;
/// Maximum contribution of transitive dependents.
const TRANSITIVE_CAP: usize = 30;
/// Points when a contract-bearing edge is found downstream.
const CONTRACT_EDGE_PENALTY: usize = 30;

/// Options for [`ProtocolGraph::analyze_impact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ImpactOptions {
    /// Maximum traversal depth; `None` is unbounded
    pub max_depth: Option<usize>,
    /// Compute the upstream (dependency) sets
    pub include_upstream: bool,
    /// Compute the downstream (dependent) sets
    pub include_downstream: bool,
}

impl Default for ImpactOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            include_upstream: true,
            include_downstream: true,
        }
    }
}

/// Direct and transitive members of one direction of an impact query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpactSet {
    /// Immediate neighbours, sorted
    pub direct: Vec<String>,
    /// Everything further away, sorted; never overlaps `direct`
    pub transitive: Vec<String>,
}

impl ImpactSet {
    fn from_traversal(graph: &ProtocolGraph, traversal: &Traversal, exclude: &str) -> Self {
        let arena = graph.arena();
        let mut set = Self::default();
        for reached in &traversal.reached {
            let urn = &arena[reached.index].urn;
            if urn == exclude {
                continue;
            }
            if reached.depth == 1 {
                set.direct.push(urn.clone());
            } else {
                set.transitive.push(urn.clone());
            }
        }
        set.direct.sort();
        set.transitive.sort();
        set
    }

    /// Number of direct members.
    #[must_use]
    pub fn direct_count(&self) -> usize {
        self.direct.len()
    }

    /// Number of transitive members.
    #[must_use]
    pub fn transitive_count(&self) -> usize {
        self.transitive.len()
    }

    /// Direct plus transitive.
    #[must_use]
    pub fn total(&self) -> usize {
        self.direct.len() + self.transitive.len()
    }
}

/// Result of [`ProtocolGraph::analyze_impact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactReport {
    /// Queried URN
    pub urn: String,
    /// Whether the URN is in the graph
    pub exists: bool,
    /// Artifacts reached by following edges forward
    pub downstream: ImpactSet,
    /// Artifacts reached by following edges in reverse
    pub upstream: ImpactSet,
}

impl ImpactReport {
    fn missing(urn: &str) -> Self {
        Self {
            urn: urn.to_string(),
            exists: false,
            downstream: ImpactSet::default(),
            upstream: ImpactSet::default(),
        }
    }

    /// Total number of affected artifacts in both directions.
    #[must_use]
    pub fn total_affected(&self) -> usize {
        self.downstream.total() + self.upstream.total()
    }
}

/// Result of [`ProtocolGraph::analyze_detailed_impact`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedImpact {
    /// The basic impact sets
    pub impact: ImpactReport,
    /// Downstream artifacts grouped by the edge kind that reaches them
    pub downstream_by_kind: BTreeMap<EdgeKind, Vec<String>>,
    /// Upstream artifacts grouped by the edge kind that reaches them
    pub upstream_by_kind: BTreeMap<EdgeKind, Vec<String>>,
    /// Every edge kind followed during downstream traversal
    pub downstream_edge_kinds: BTreeSet<EdgeKind>,
    /// The node's own outgoing edges
    pub direct_out_edges: Vec<EdgeInfo>,
    /// The node's own incoming edges
    pub direct_in_edges: Vec<EdgeInfo>,
}

/// Risk label derived from a 0..=100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Score 0
    None,
    /// Score 1..=25
    Low,
    /// Score 26..=60
    Medium,
    /// Score 61 and above
    High,
}

impl RiskLevel {
    /// Label for a score.
    #[must_use]
    pub fn from_score(score: u32) -> Self {
        match score {
            0 => Self::None,
            1..=25 => Self::Low,
            26..=60 => Self::Medium,
            _ => Self::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Result of [`ProtocolGraph::calculate_structural_risk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralRisk {
    /// Queried URN
    pub urn: String,
    /// Whether the URN is in the graph
    pub exists: bool,
    /// Score in 0..=100
    pub score: u32,
    /// Label for `score`
    pub level: RiskLevel,
    /// Number of direct downstream artifacts
    pub direct_dependents: usize,
    /// Number of transitive downstream artifacts
    pub transitive_dependents: usize,
    /// Whether an exposes/produces/derives_from edge is reachable downstream
    pub has_contract_edges: bool,
}

/// Topology-only blast radius score.
#[must_use]
pub fn structural_score(direct: usize, transitive: usize, has_contract_edges: bool) -> u32 {
    let score = (DIRECT_WEIGHT.saturating_mul(direct)).min(DIRECT_CAP)
        + (TRANSITIVE_WEIGHT.saturating_mul(transitive)).min(TRANSITIVE_CAP)
        + if has_contract_edges {
            CONTRACT_EDGE_PENALTY
        } else {
            0
        };
    u32::try_from(score.min(100)).unwrap_or(100)
}

impl ProtocolGraph {
    /// Direct and transitive dependents and dependencies of a node.
    ///
    /// The result is cached per `(urn, options)` until the next mutation.
    #[must_use]
    pub fn analyze_impact(&self, urn: &str, options: ImpactOptions) -> ImpactReport {
        let urn = urn.trim();
        let key = CacheKey::Impact {
            urn: urn.to_string(),
            options,
        };
        let report = cache::get_or_compute(self.cache(), key, || self.compute_impact(urn, options));
        (*report).clone()
    }

    /// Basic impact plus per-edge-kind grouping.
    ///
    /// The result is cached per `(urn, max_depth)` until the next mutation.
    #[must_use]
    pub fn analyze_detailed_impact(&self, urn: &str, max_depth: Option<usize>) -> DetailedImpact {
        let urn = urn.trim();
        let key = CacheKey::DetailedImpact {
            urn: urn.to_string(),
            max_depth,
        };
        let detailed = cache::get_or_compute(self.cache(), key, || {
            self.compute_detailed_impact(urn, max_depth)
        });
        (*detailed).clone()
    }

    /// Topology-only risk score of changing a node:
    /// `min(40, 10 x direct) + min(30, 2 x transitive) + 30` when an
    /// exposes/produces/derives_from edge is reachable downstream.
    #[must_use]
    pub fn calculate_structural_risk(&self, urn: &str) -> StructuralRisk {
        let detailed = self.analyze_detailed_impact(urn, None);
        let downstream = &detailed.impact.downstream;
        let has_contract_edges = detailed
            .downstream_edge_kinds
            .iter()
            .any(EdgeKind::is_contract_bearing);
        let score = structural_score(
            downstream.direct_count(),
            downstream.transitive_count(),
            has_contract_edges,
        );

        StructuralRisk {
            urn: detailed.impact.urn.clone(),
            exists: detailed.impact.exists,
            score,
            level: RiskLevel::from_score(score),
            direct_dependents: downstream.direct_count(),
            transitive_dependents: downstream.transitive_count(),
            has_contract_edges,
        }
    }

    fn compute_impact(&self, urn: &str, options: ImpactOptions) -> ImpactReport {
        let Some(start) = self.index_of(urn) else {
            return ImpactReport::missing(urn);
        };
        let arena = self.arena();

        let downstream = if options.include_downstream {
            let traversal = traversal::bfs(arena, start, Direction::Outgoing, options.max_depth);
            ImpactSet::from_traversal(self, &traversal, urn)
        } else {
            ImpactSet::default()
        };
        let upstream = if options.include_upstream {
            let traversal = traversal::bfs(arena, start, Direction::Incoming, options.max_depth);
            ImpactSet::from_traversal(self, &traversal, urn)
        } else {
            ImpactSet::default()
        };

        ImpactReport {
            urn: urn.to_string(),
            exists: true,
            downstream,
            upstream,
        }
    }

    fn compute_detailed_impact(&self, urn: &str, max_depth: Option<usize>) -> DetailedImpact {
        let options = ImpactOptions {
            max_depth,
            ..ImpactOptions::default()
        };
        let impact = self.analyze_impact(urn, options);

        let Some(start) = self.index_of(urn) else {
            return DetailedImpact {
                impact,
                downstream_by_kind: BTreeMap::new(),
                upstream_by_kind: BTreeMap::new(),
                downstream_edge_kinds: BTreeSet::new(),
                direct_out_edges: Vec::new(),
                direct_in_edges: Vec::new(),
            };
        };

        let arena = self.arena();
        let forward = traversal::bfs(arena, start, Direction::Outgoing, max_depth);
        let backward = traversal::bfs(arena, start, Direction::Incoming, max_depth);

        let direct_out_edges = self.get_out_edges(urn);
        let direct_in_edges = self.get_in_edges(urn);

        let mut downstream_by_kind = group_by_kind(self, &forward, urn);
        let mut upstream_by_kind = group_by_kind(self, &backward, urn);

        // A direct neighbour linked by several edge kinds belongs to each group
        if max_depth != Some(0) {
            for edge in direct_out_edges.iter().filter(|e| e.to != urn) {
                downstream_by_kind.entry(edge.kind).or_default().push(edge.to.clone());
            }
            for edge in direct_in_edges.iter().filter(|e| e.from != urn) {
                upstream_by_kind.entry(edge.kind).or_default().push(edge.from.clone());
            }
        }
        for urns in downstream_by_kind.values_mut().chain(upstream_by_kind.values_mut()) {
            urns.sort();
            urns.dedup();
        }

        DetailedImpact {
            impact,
            downstream_by_kind,
            upstream_by_kind,
            downstream_edge_kinds: forward.edge_kinds,
            direct_out_edges,
            direct_in_edges,
        }
    }
}

fn group_by_kind(
    graph: &ProtocolGraph,
    traversal: &Traversal,
    exclude: &str,
) -> BTreeMap<EdgeKind, Vec<String>> {
    let arena = graph.arena();
    let mut groups: BTreeMap<EdgeKind, Vec<String>> = BTreeMap::new();
    for reached in &traversal.reached {
        let urn = &arena[reached.index].urn;
        if urn != exclude {
            groups.entry(reached.via).or_default().push(urn.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Manifest, NodeKind};
    use rstest::rstest;
    use serde_json::Map;

    fn urn(name: &str) -> String {
        format!("urn:proto:api:acme/{name}")
    }

    fn build(edges: &[(&str, EdgeKind, &str)]) -> ProtocolGraph {
        let mut graph = ProtocolGraph::new();
        for (from, _, to) in edges {
            for name in [from, to] {
                graph
                    .add_node(&urn(name), NodeKind::Api, Manifest::default())
                    .unwrap();
            }
        }
        for (from, kind, to) in edges {
            graph
                .add_edge(&urn(from), *kind, &urn(to), Map::new())
                .unwrap();
        }
        graph
    }

    #[test]
    fn depends_on_edge_is_symmetric_across_directions() {
        let graph = build(&[("x", EdgeKind::DependsOn, "y")]);

        let x = graph.analyze_impact(&urn("x"), ImpactOptions::default());
        let y = graph.analyze_impact(&urn("y"), ImpactOptions::default());

        assert_eq!(x.downstream.direct, vec![urn("y")]);
        assert_eq!(y.upstream.direct, vec![urn("x")]);
    }

    #[test]
    fn transitive_excludes_direct_and_self() {
        let graph = build(&[
            ("a", EdgeKind::DependsOn, "b"),
            ("b", EdgeKind::DependsOn, "c"),
            ("a", EdgeKind::DependsOn, "c"),
            ("c", EdgeKind::DependsOn, "d"),
            ("d", EdgeKind::DependsOn, "a"),
        ]);

        let impact = graph.analyze_impact(&urn("a"), ImpactOptions::default());
        assert_eq!(impact.downstream.direct, vec![urn("b"), urn("c")]);
        assert_eq!(impact.downstream.transitive, vec![urn("d")]);
        assert!(!impact.downstream.transitive.contains(&urn("a")));
    }

    #[test]
    fn options_disable_directions_and_bound_depth() {
        let graph = build(&[
            ("a", EdgeKind::DependsOn, "b"),
            ("b", EdgeKind::DependsOn, "c"),
            ("z", EdgeKind::DependsOn, "a"),
        ]);

        let options = ImpactOptions {
            max_depth: Some(1),
            include_upstream: false,
            include_downstream: true,
        };
        let impact = graph.analyze_impact(&urn("a"), options);
        assert_eq!(impact.downstream.direct, vec![urn("b")]);
        assert!(impact.downstream.transitive.is_empty());
        assert_eq!(impact.upstream, ImpactSet::default());
    }

    #[test]
    fn unknown_node_is_reported_not_raised() {
        let graph = build(&[]);
        let impact = graph.analyze_impact(&urn("ghost"), ImpactOptions::default());
        assert!(!impact.exists);
        assert_eq!(impact.total_affected(), 0);

        let risk = graph.calculate_structural_risk(&urn("ghost"));
        assert!(!risk.exists);
        assert_eq!(risk.level, RiskLevel::None);
    }

    #[test]
    fn detailed_impact_groups_by_edge_kind() {
        let graph = build(&[
            ("gateway", EdgeKind::Exposes, "orders"),
            ("gateway", EdgeKind::DependsOn, "orders"),
            ("gateway", EdgeKind::DependsOn, "auth"),
            ("orders", EdgeKind::Produces, "order-created"),
        ]);

        let detailed = graph.analyze_detailed_impact(&urn("gateway"), None);
        assert_eq!(
            detailed.downstream_by_kind[&EdgeKind::Exposes],
            vec![urn("orders")]
        );
        assert_eq!(
            detailed.downstream_by_kind[&EdgeKind::DependsOn],
            vec![urn("auth"), urn("orders")]
        );
        assert_eq!(
            detailed.downstream_by_kind[&EdgeKind::Produces],
            vec![urn("order-created")]
        );
        assert!(detailed.downstream_edge_kinds.contains(&EdgeKind::Produces));
        assert_eq!(detailed.direct_out_edges.len(), 3);

        let upstream = graph.analyze_detailed_impact(&urn("orders"), None);
        assert_eq!(
            upstream.upstream_by_kind[&EdgeKind::Exposes],
            vec![urn("gateway")]
        );
    }

    #[rstest]
    #[case(0, 0, false, 0)]
    #[case(1, 0, false, 10)]
    #[case(5, 0, false, 40)]
    #[case(0, 3, false, 6)]
    #[case(0, 40, false, 30)]
    #[case(0, 0, true, 30)]
    #[case(9, 99, true, 100)]
    fn structural_score_formula(
        #[case] direct: usize,
        #[case] transitive: usize,
        #[case] contract: bool,
        #[case] expected: u32,
    ) {
        assert_eq!(structural_score(direct, transitive, contract), expected);
    }

    #[rstest]
    #[case(0, RiskLevel::None)]
    #[case(1, RiskLevel::Low)]
    #[case(25, RiskLevel::Low)]
    #[case(26, RiskLevel::Medium)]
    #[case(60, RiskLevel::Medium)]
    #[case(61, RiskLevel::High)]
    #[case(100, RiskLevel::High)]
    fn risk_level_thresholds(#[case] score: u32, #[case] expected: RiskLevel) {
        assert_eq!(RiskLevel::from_score(score), expected);
    }

    #[test]
    fn structural_risk_counts_contract_edges_downstream() {
        let graph = build(&[
            ("a", EdgeKind::DependsOn, "b"),
            ("b", EdgeKind::Exposes, "c"),
        ]);

        let risk = graph.calculate_structural_risk(&urn("a"));
        assert_eq!(risk.direct_dependents, 1);
        assert_eq!(risk.transitive_dependents, 1);
        assert!(risk.has_contract_edges);
        assert_eq!(risk.score, 10 + 2 + 30);
        assert_eq!(risk.level, RiskLevel::Medium);

        let leaf = graph.calculate_structural_risk(&urn("c"));
        assert_eq!(leaf.score, 0);
        assert_eq!(leaf.level, RiskLevel::None);
    }

    #[test]
    fn repeated_impact_is_served_from_cache() {
        let mut graph = build(&[("a", EdgeKind::DependsOn, "b")]);

        let first = graph.analyze_impact(&urn("a"), ImpactOptions::default());
        let misses = graph.get_cache_stats().misses;
        let second = graph.analyze_impact(&urn("a"), ImpactOptions::default());

        assert_eq!(first, second);
        assert_eq!(graph.get_cache_stats().misses, misses);
        assert!(graph.get_cache_stats().hits >= 1);

        graph
            .add_node(&urn("c"), NodeKind::Api, Manifest::default())
            .unwrap();
        graph
            .add_edge(&urn("a"), EdgeKind::DependsOn, &urn("c"), Map::new())
            .unwrap();
        let third = graph.analyze_impact(&urn("a"), ImpactOptions::default());

        assert_eq!(graph.get_cache_stats().misses, misses + 1);
        assert_eq!(third.downstream.direct, vec![urn("b"), urn("c")]);
    }
}
