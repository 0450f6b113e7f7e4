//! Thread-safe handle to a graph.
//!
//! [`SharedGraph`] wraps a [`ProtocolGraph`] in `Arc<RwLock<_>>`: many
//! concurrent readers, one exclusive writer. Each method holds its guard for
//! the whole operation, so a batch is never observed half-applied and a
//! mutation's index update and cache invalidation happen under one guard.
//!
//! # Lock Ordering
//!
//! The graph's internal cache mutex is only taken while a guard on the
//! outer lock is held, never the other way around.

use crate::batch::{BatchReport, BatchUpdate, InvariantOptions, InvariantReport};
use crate::breaking::RiskAssessment;
use crate::cache::CacheStats;
use crate::config::GraphConfig;
use crate::domain::{EdgeKind, Manifest, NodeKind};
use crate::error::Result;
use crate::graph::{Cycle, GraphSnapshot, GraphStats, ProtocolGraph};
use crate::impact::{DetailedImpact, ImpactOptions, ImpactReport, PiiFlowReport, StructuralRisk};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cloneable, thread-safe graph handle.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    inner: Arc<RwLock<ProtocolGraph>>,
}

impl SharedGraph {
    /// Wrap an existing graph.
    #[must_use]
    pub fn new(graph: ProtocolGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    /// Create an empty graph with the given configuration.
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self::new(ProtocolGraph::with_config(config))
    }

    /// Shared access for queries not covered by the methods below.
    pub async fn read(&self) -> RwLockReadGuard<'_, ProtocolGraph> {
        self.inner.read().await
    }

    /// Exclusive access for multi-step mutations.
    pub async fn write(&self) -> RwLockWriteGuard<'_, ProtocolGraph> {
        self.inner.write().await
    }

    /// See [`ProtocolGraph::add_node`].
    ///
    /// # Errors
    ///
    /// As `add_node`.
    pub async fn add_node(&self, urn: &str, kind: NodeKind, manifest: Manifest) -> Result<bool> {
        self.inner.write().await.add_node(urn, kind, manifest)
    }

    /// See [`ProtocolGraph::add_edge`].
    ///
    /// # Errors
    ///
    /// As `add_edge`.
    pub async fn add_edge(
        &self,
        from: &str,
        kind: EdgeKind,
        to: &str,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        self.inner.write().await.add_edge(from, kind, to, metadata)
    }

    /// See [`ProtocolGraph::remove_node`].
    pub async fn remove_node(&self, urn: &str) -> bool {
        self.inner.write().await.remove_node(urn)
    }

    /// See [`ProtocolGraph::apply_batch`].
    pub async fn apply_batch(&self, batch: BatchUpdate) -> BatchReport {
        self.inner.write().await.apply_batch(batch)
    }

    /// See [`ProtocolGraph::apply_batch_with_placeholders`].
    pub async fn apply_batch_with_placeholders(&self, batch: BatchUpdate) -> BatchReport {
        self.inner.write().await.apply_batch_with_placeholders(batch)
    }

    /// See [`ProtocolGraph::validate_invariants`].
    pub async fn validate_invariants(&self, options: InvariantOptions) -> InvariantReport {
        self.inner.read().await.validate_invariants(options)
    }

    /// See [`ProtocolGraph::detect_cycles`].
    pub async fn detect_cycles(&self) -> Vec<Cycle> {
        self.inner.read().await.detect_cycles()
    }

    /// See [`ProtocolGraph::analyze_impact`].
    pub async fn impact_of_change(&self, urn: &str, options: ImpactOptions) -> ImpactReport {
        self.inner.read().await.analyze_impact(urn, options)
    }

    /// See [`ProtocolGraph::analyze_detailed_impact`].
    pub async fn detailed_impact(&self, urn: &str, max_depth: Option<usize>) -> DetailedImpact {
        self.inner.read().await.analyze_detailed_impact(urn, max_depth)
    }

    /// See [`ProtocolGraph::calculate_structural_risk`].
    pub async fn structural_risk(&self, urn: &str) -> StructuralRisk {
        self.inner.read().await.calculate_structural_risk(urn)
    }

    /// See [`ProtocolGraph::assess_breaking_change_risk`].
    pub async fn assess_risk(&self, urn: &str, updated: Option<&Manifest>) -> RiskAssessment {
        self.inner.read().await.assess_breaking_change_risk(urn, updated)
    }

    /// See [`ProtocolGraph::trace_pii_flow`].
    pub async fn trace_pii_flow(&self, urn: &str, max_depth: Option<usize>) -> PiiFlowReport {
        self.inner.read().await.trace_pii_flow(urn, max_depth)
    }

    /// See [`ProtocolGraph::get_stats`].
    pub async fn get_stats(&self) -> GraphStats {
        self.inner.read().await.get_stats()
    }

    /// See [`ProtocolGraph::get_cache_stats`].
    pub async fn get_cache_stats(&self) -> CacheStats {
        self.inner.read().await.get_cache_stats()
    }

    /// See [`ProtocolGraph::to_json`].
    pub async fn to_json(&self) -> GraphSnapshot {
        self.inner.read().await.to_json()
    }

    /// See [`ProtocolGraph::from_json`].
    ///
    /// # Errors
    ///
    /// As `from_json`; the graph is unchanged on error.
    pub async fn from_json(&self, snapshot: &GraphSnapshot) -> Result<()> {
        self.inner.write().await.from_json(snapshot)
    }
}

impl From<ProtocolGraph> for SharedGraph {
    fn from(graph: ProtocolGraph) -> Self {
        Self::new(graph)
    }
}
