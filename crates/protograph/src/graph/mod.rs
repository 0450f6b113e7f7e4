//! In-memory protocol artifact graph.
//!
//! # Architecture
//!
//! The implementation uses:
//! - `petgraph::stable_graph::StableDiGraph` as an arena of nodes and edges
//!   addressed by integer handles; handles stay valid across removals
//! - `HashMap<String, NodeIndex>` mapping URNs to handles
//! - three derived indices (normalized URN, kind, authority)
//! - a [`QueryCache`] behind a mutex so `&self` queries can memoize results
//!
//! Logical cycles in the artifact graph are expected and detectable, but
//! the data structure itself holds no owning back-references: every
//! relationship is an index lookup.
//!
//! ## Edge Direction Convention
//!
//! Edges point from the artifact that declares the relationship to the
//! artifact it refers to. "Downstream" follows edges forward and "upstream"
//! follows them in reverse:
//!
//! - `orders-api depends_on users-data` is `orders-api -> users-data`;
//!   `users-data` is downstream of `orders-api`
//! - `orders-api` is upstream of `users-data`
//!
//! ## Mutation Contract
//!
//! Every mutation validates first, mutates nodes, edges and indices, and
//! invalidates the cache as its final step. Queries never observe a
//! half-applied mutation because mutations take `&mut self`.

mod cycles;
mod indices;
mod snapshot;
pub mod traversal;

pub use cycles::Cycle;
pub use snapshot::{EdgeRecord, GraphSnapshot, NodeRecord};

use crate::cache::{self, CacheStats, QueryCache};
use crate::config::GraphConfig;
use crate::domain::{EdgeData, EdgeInfo, EdgeKind, Manifest, Node, NodeKind, RESERVED_EDGE_KEYS};
use crate::error::{Error, Result};
use crate::urn;
use indices::GraphIndices;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

/// Arena type backing the graph.
pub(crate) type Arena = StableDiGraph<Node, EdgeData>;

/// Dependency graph over protocol artifacts.
#[derive(Debug)]
pub struct ProtocolGraph {
    graph: Arena,
    node_map: HashMap<String, NodeIndex>,
    indices: GraphIndices,
    cache: Mutex<QueryCache>,
    config: GraphConfig,
}

/// Counts describing the current graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Number of nodes
    pub node_count: usize,
    /// Number of edges
    pub edge_count: usize,
    /// Node count per kind (kinds with no nodes are omitted)
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    /// Edge count per kind (kinds with no edges are omitted)
    pub edges_by_kind: BTreeMap<EdgeKind, usize>,
    /// Number of distinct authorities
    pub authority_count: usize,
    /// Number of placeholder nodes awaiting their manifest
    pub placeholder_count: usize,
}

impl Default for ProtocolGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolGraph {
    /// Create an empty graph with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph with the given configuration.
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            graph: Arena::default(),
            node_map: HashMap::new(),
            indices: GraphIndices::default(),
            cache: Mutex::new(QueryCache::new(config.cache.capacity)),
            config,
        }
    }

    /// The configuration this graph was built with.
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    // ========== Mutations ==========

    /// Insert a node.
    ///
    /// Returns `Ok(false)` without touching the graph if the URN is already
    /// present.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrn`] if the URN is malformed.
    pub fn add_node(&mut self, node_urn: &str, kind: NodeKind, manifest: Manifest) -> Result<bool> {
        let node_urn = node_urn.trim();
        let parsed = urn::parse(node_urn).ok_or_else(|| Error::InvalidUrn(node_urn.to_string()))?;

        if self.node_map.contains_key(node_urn) {
            debug!(urn = node_urn, "node already exists");
            return Ok(false);
        }

        let index = self.graph.add_node(Node {
            urn: node_urn.to_string(),
            kind,
            manifest,
        });
        self.node_map.insert(node_urn.to_string(), index);
        self.indices.insert(node_urn, kind, &parsed.authority);
        debug!(urn = node_urn, %kind, "node added");

        self.invalidate();
        Ok(true)
    }

    /// Remove a node and every edge touching it.
    ///
    /// Returns `false` if the URN was not present.
    pub fn remove_node(&mut self, node_urn: &str) -> bool {
        let Some(index) = self.node_map.remove(node_urn.trim()) else {
            return false;
        };
        let Some(node) = self.graph.remove_node(index) else {
            return false;
        };
        let authority = urn::authority(&node.urn).unwrap_or_default();
        self.indices.remove(&node.urn, node.kind, &authority);
        debug!(urn = %node.urn, "node removed");

        self.invalidate();
        true
    }

    /// Insert an edge. Parallel edges are always added, even with identical
    /// kind and metadata.
    ///
    /// # Errors
    ///
    /// [`Error::ReservedMetadataKey`] if the metadata uses `from`, `to` or
    /// `kind`, [`Error::UnknownNode`] if either endpoint is absent.
    pub fn add_edge(
        &mut self,
        from: &str,
        kind: EdgeKind,
        to: &str,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        check_edge_metadata(&metadata)?;
        let (from, to) = (from.trim(), to.trim());
        let unknown = |missing: &str| Error::UnknownNode {
            urn: missing.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        };
        let source = self.index_of(from).ok_or_else(|| unknown(from))?;
        let target = self.index_of(to).ok_or_else(|| unknown(to))?;

        self.graph.add_edge(source, target, EdgeData { kind, metadata });
        debug!(from, to, %kind, "edge added");

        self.invalidate();
        Ok(())
    }

    /// Remove edges from `from` to `to`, optionally only those of `kind`.
    ///
    /// Returns the number of edges removed.
    pub fn remove_edges(&mut self, from: &str, kind: Option<EdgeKind>, to: &str) -> usize {
        let (Some(source), Some(target)) = (self.index_of(from), self.index_of(to)) else {
            return 0;
        };
        let doomed: Vec<EdgeIndex> = self
            .graph
            .edges(source)
            .filter(|e| e.target() == target && kind.is_none_or(|k| e.weight().kind == k))
            .map(|e| e.id())
            .collect();

        for edge in &doomed {
            self.graph.remove_edge(*edge);
        }
        if !doomed.is_empty() {
            debug!(from, to, removed = doomed.len(), "edges removed");
            self.invalidate();
        }
        doomed.len()
    }

    /// Replace a node's whole manifest.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the URN is absent.
    pub fn replace_manifest(&mut self, node_urn: &str, manifest: Manifest) -> Result<()> {
        let kind = self
            .get_node(node_urn)
            .map(|n| n.kind)
            .ok_or_else(|| Error::NodeNotFound(node_urn.to_string()))?;
        self.replace_node(node_urn, kind, manifest)
    }

    /// Replace a node's kind and manifest, keeping its edges.
    pub(crate) fn replace_node(
        &mut self,
        node_urn: &str,
        kind: NodeKind,
        manifest: Manifest,
    ) -> Result<()> {
        let index = self
            .index_of(node_urn)
            .ok_or_else(|| Error::NodeNotFound(node_urn.to_string()))?;
        let node = &mut self.graph[index];
        let old_kind = node.kind;
        node.kind = kind;
        node.manifest = manifest;
        self.indices.change_kind(node_urn.trim(), old_kind, kind);
        debug!(urn = node_urn, %kind, "manifest replaced");

        self.invalidate();
        Ok(())
    }

    /// Remove every node, edge, index entry and cached result.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.node_map.clear();
        self.indices.clear();
        self.invalidate();
    }

    // ========== Lookups ==========

    /// All graph URNs sharing the identity of `reference`.
    ///
    /// A version or range after `@` keeps only candidates whose own version
    /// satisfies it; unversioned candidates never satisfy a range.
    #[must_use]
    pub fn resolve_urn(&self, reference: &str) -> Vec<String> {
        let (base, range) = urn::split_version(reference);
        let candidates = self.indices.versions_of(&base);

        let Some(range) = range else {
            return candidates.cloned().collect();
        };

        candidates
            .filter(|candidate| {
                urn::parse(candidate)
                    .and_then(|p| p.version)
                    .is_some_and(|version| {
                        version == range || urn::version_matches_range(&version, &range)
                    })
            })
            .cloned()
            .collect()
    }

    /// Does the graph hold this exact URN?
    #[must_use]
    pub fn contains(&self, node_urn: &str) -> bool {
        self.node_map.contains_key(node_urn.trim())
    }

    /// Look up a node by exact URN.
    #[must_use]
    pub fn get_node(&self, node_urn: &str) -> Option<&Node> {
        self.index_of(node_urn).map(|index| &self.graph[index])
    }

    /// Edges leaving the node, sorted by target then kind.
    #[must_use]
    pub fn get_out_edges(&self, node_urn: &str) -> Vec<EdgeInfo> {
        self.edges_of(node_urn, Direction::Outgoing)
    }

    /// Edges arriving at the node, sorted by source then kind.
    #[must_use]
    pub fn get_in_edges(&self, node_urn: &str) -> Vec<EdgeInfo> {
        self.edges_of(node_urn, Direction::Incoming)
    }

    /// URNs of every node of `kind`, sorted.
    #[must_use]
    pub fn get_nodes_by_kind(&self, kind: NodeKind) -> Vec<String> {
        self.indices.of_kind(kind).cloned().collect()
    }

    /// URNs of every node published by `authority`, sorted.
    #[must_use]
    pub fn get_nodes_by_authority(&self, authority: &str) -> Vec<String> {
        self.indices.of_authority(authority).cloned().collect()
    }

    /// Iterate over every node.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_indices().map(|index| &self.graph[index])
    }

    /// URNs of placeholder nodes, sorted.
    #[must_use]
    pub fn placeholders(&self) -> Vec<String> {
        let mut urns: Vec<String> = self
            .nodes()
            .filter(|n| n.is_placeholder())
            .map(|n| n.urn.clone())
            .collect();
        urns.sort();
        urns
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Counts by kind and authority.
    #[must_use]
    pub fn get_stats(&self) -> GraphStats {
        let mut edges_by_kind = BTreeMap::new();
        for edge in self.graph.edge_indices().map(|index| &self.graph[index]) {
            *edges_by_kind.entry(edge.kind).or_insert(0) += 1;
        }
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            nodes_by_kind: self.indices.kind_counts().collect(),
            edges_by_kind,
            authority_count: self.indices.authority_count(),
            placeholder_count: self.nodes().filter(|n| n.is_placeholder()).count(),
        }
    }

    /// Cache hit/miss counters.
    #[must_use]
    pub fn get_cache_stats(&self) -> CacheStats {
        cache::lock(&self.cache).stats()
    }

    // ========== Crate internals ==========

    pub(crate) fn index_of(&self, node_urn: &str) -> Option<NodeIndex> {
        self.node_map.get(node_urn.trim()).copied()
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.graph
    }

    pub(crate) fn cache(&self) -> &Mutex<QueryCache> {
        &self.cache
    }

    pub(crate) fn index_problems(&self) -> Vec<String> {
        let mut problems = self.indices.verify(self.nodes());
        if self.node_map.len() != self.graph.node_count() {
            problems.push("URN map does not match node set".to_string());
        }
        problems
    }

    fn invalidate(&mut self) {
        self.cache
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .invalidate();
    }

    fn edges_of(&self, node_urn: &str, direction: Direction) -> Vec<EdgeInfo> {
        let Some(index) = self.index_of(node_urn) else {
            return Vec::new();
        };
        let mut edges: Vec<EdgeInfo> = self
            .graph
            .edges_directed(index, direction)
            .map(|e| EdgeInfo {
                from: self.graph[e.source()].urn.clone(),
                to: self.graph[e.target()].urn.clone(),
                kind: e.weight().kind,
                metadata: e.weight().metadata.clone(),
            })
            .collect();
        edges.sort_by(|a, b| {
            (&a.from, &a.to, a.kind).cmp(&(&b.from, &b.to, b.kind))
        });
        edges
    }
}

/// Reject metadata that would shadow an edge's `from`, `to` or `kind` once
/// serialized.
pub(crate) fn check_edge_metadata(metadata: &Map<String, Value>) -> Result<()> {
    match RESERVED_EDGE_KEYS.iter().find(|key| metadata.contains_key(**key)) {
        Some(key) => Err(Error::ReservedMetadataKey((*key).to_string())),
        None => Ok(()),
    }
}
