//! Circular dependency detection.
//!
//! Uses petgraph's Tarjan strongly-connected-component implementation. A
//! cycle is an SCC with at least two members, or a single node with an edge
//! to itself.

use super::{Arena, ProtocolGraph};
use crate::cache::{self, CacheKey};
use petgraph::algo;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::debug;

/// A set of mutually reachable artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    /// Member URNs, sorted
    pub members: Vec<String>,
}

impl Cycle {
    /// Is `urn` part of this cycle?
    #[must_use]
    pub fn contains(&self, urn: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(urn)).is_ok()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; cycles have at least one member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Find every cycle in the arena, sorted by first member.
pub(crate) fn find_cycles(graph: &Arena) -> Vec<Cycle> {
    let mut cycles: Vec<Cycle> = algo::tarjan_scc(graph)
        .into_iter()
        .filter(|scc| match scc.as_slice() {
            [single] => graph.edges(*single).any(|e| e.target() == *single),
            _ => true,
        })
        .map(|scc| {
            let mut members: Vec<String> =
                scc.into_iter().map(|index| graph[index].urn.clone()).collect();
            members.sort();
            Cycle { members }
        })
        .collect();
    cycles.sort_by(|a, b| a.members.cmp(&b.members));
    cycles
}

impl ProtocolGraph {
    /// Every circular dependency in the graph.
    ///
    /// The result is cached until the next mutation.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<Cycle> {
        let cycles = cache::get_or_compute(self.cache(), CacheKey::Cycles, || {
            let cycles = find_cycles(self.arena());
            debug!(count = cycles.len(), "cycle detection complete");
            cycles
        });
        (*cycles).clone()
    }

    /// Is the node part of any cycle?
    #[must_use]
    pub fn is_in_cycle(&self, urn: &str) -> bool {
        self.get_cycle(urn).is_some()
    }

    /// The cycle containing the node, if any.
    #[must_use]
    pub fn get_cycle(&self, urn: &str) -> Option<Cycle> {
        let urn = urn.trim();
        self.detect_cycles().into_iter().find(|c| c.contains(urn))
    }
}
