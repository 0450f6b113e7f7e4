//! Protograph - a dependency graph engine for versioned protocol artifacts.
//!
//! Artifacts (APIs, data schemas, events, workflows, ...) are addressed by
//! URN and linked by typed relationships. On top of the graph the crate
//! answers governance questions:
//!
//! - which artifacts form circular dependencies
//! - what is affected, directly and transitively, when an artifact changes
//! - whether a proposed manifest breaks its consumers and how risky it is
//! - where personal data flows
//!
//! # Example
//!
//! ```
//! use protograph::{EdgeKind, Manifest, NodeKind, ProtocolGraph, ImpactOptions};
//! use serde_json::Map;
//!
//! let mut graph = ProtocolGraph::new();
//! graph.add_node("urn:proto:api:acme/orders@1.0.0", NodeKind::Api, Manifest::default())?;
//! graph.add_node("urn:proto:data:acme/users@1.0.0", NodeKind::Data, Manifest::default())?;
//! graph.add_edge(
//!     "urn:proto:api:acme/orders@1.0.0",
//!     EdgeKind::ReadsFrom,
//!     "urn:proto:data:acme/users@1.0.0",
//!     Map::new(),
//! )?;
//!
//! let impact = graph.analyze_impact("urn:proto:data:acme/users@1.0.0", ImpactOptions::default());
//! assert_eq!(impact.upstream.direct, vec!["urn:proto:api:acme/orders@1.0.0"]);
//! # Ok::<(), protograph::Error>(())
//! ```

#![forbid(unsafe_code)]

pub mod batch;
pub mod breaking;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod impact;
pub mod shared;
pub mod urn;

pub use batch::{
    BatchReport, BatchUpdate, EdgeInput, InvariantOptions, InvariantReport, NodeInput, Violation,
    ViolationKind,
};
pub use breaking::{
    detect_changes, detect_changes_at, BreakingChangeCode, ChangeDetail, ChangeSet, RiskAssessment,
    Severity,
};
pub use cache::CacheStats;
pub use config::GraphConfig;
pub use domain::{ArtifactType, EdgeInfo, EdgeKind, Manifest, Node, NodeKind};
pub use error::{BatchIssue, BatchIssueType, Error, Result};
pub use graph::{Cycle, GraphSnapshot, GraphStats, ProtocolGraph};
pub use impact::{
    DetailedImpact, ImpactOptions, ImpactReport, ImpactSet, PiiFlowReport, PiiRecipient,
    RiskLevel, StructuralRisk,
};
pub use shared::SharedGraph;
