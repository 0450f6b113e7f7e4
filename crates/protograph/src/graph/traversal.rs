//! Depth-bounded reachability.
//!
//! Forward traversal follows edges from source to target ("downstream");
//! backward traversal follows them from target to source ("upstream"). The
//! start node is only part of the result when a cycle leads back to it.

use super::{Arena, ProtocolGraph};
use crate::domain::EdgeKind;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// A node discovered during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reached {
    pub(crate) index: NodeIndex,
    /// Hops from the start node (direct neighbours are depth 1)
    pub(crate) depth: usize,
    /// Kind of the edge through which the node was first discovered
    pub(crate) via: EdgeKind,
}

/// Result of a breadth-first traversal.
#[derive(Debug, Clone, Default)]
pub(crate) struct Traversal {
    /// Nodes in discovery order
    pub(crate) reached: Vec<Reached>,
    /// Kinds of every edge followed
    pub(crate) edge_kinds: BTreeSet<EdgeKind>,
}

/// Breadth-first traversal from `start` in `direction`.
///
/// Edges are followed only from nodes shallower than `max_depth`, so
/// `Some(1)` yields direct neighbours and `Some(0)` yields nothing.
pub(crate) fn bfs(
    graph: &Arena,
    start: NodeIndex,
    direction: Direction,
    max_depth: Option<usize>,
) -> Traversal {
    bfs_filtered(graph, start, direction, max_depth, |_| true)
}

/// [`bfs`] restricted to edges whose kind passes `follow`.
pub(crate) fn bfs_filtered(
    graph: &Arena,
    start: NodeIndex,
    direction: Direction,
    max_depth: Option<usize>,
    follow: impl Fn(EdgeKind) -> bool,
) -> Traversal {
    let mut traversal = Traversal::default();
    let mut visited = HashSet::new();
    let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
    queue.push_back((start, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }

        for edge in graph.edges_directed(current, direction) {
            if !follow(edge.weight().kind) {
                continue;
            }
            let next = match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            };
            traversal.edge_kinds.insert(edge.weight().kind);
            if visited.insert(next) {
                traversal.reached.push(Reached {
                    index: next,
                    depth: depth + 1,
                    via: edge.weight().kind,
                });
                queue.push_back((next, depth + 1));
            }
        }
    }

    traversal
}

/// URNs reachable from `start` by following edges forward.
///
/// Returns an empty set when `start` is not in the graph.
#[must_use]
pub fn reachable_nodes(graph: &ProtocolGraph, start: &str, max_depth: Option<usize>) -> BTreeSet<String> {
    collect(graph, start, Direction::Outgoing, max_depth)
}

/// URNs from which `target` is reachable, i.e. the forward traversal over
/// reversed edges.
#[must_use]
pub fn nodes_reaching_target(
    graph: &ProtocolGraph,
    target: &str,
    max_depth: Option<usize>,
) -> BTreeSet<String> {
    collect(graph, target, Direction::Incoming, max_depth)
}

fn collect(
    graph: &ProtocolGraph,
    urn: &str,
    direction: Direction,
    max_depth: Option<usize>,
) -> BTreeSet<String> {
    let Some(start) = graph.index_of(urn) else {
        return BTreeSet::new();
    };
    let arena = graph.arena();
    bfs(arena, start, direction, max_depth)
        .reached
        .into_iter()
        .map(|r| arena[r.index].urn.clone())
        .collect()
}
