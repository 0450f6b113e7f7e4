//! Domain types for the protocol artifact graph.
//!
//! This module contains the node and edge vocabulary of the graph and the
//! [`Manifest`] wrapper that gives typed access to artifact payloads.

mod manifest;

pub use manifest::{ArtifactType, Endpoint, Manifest};

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Category of a protocol artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// HTTP/RPC API
    Api,
    /// A single endpoint of an API
    ApiEndpoint,
    /// Data schema
    Data,
    /// Event contract
    Event,
    /// Workflow definition
    Workflow,
    /// Agent definition
    Agent,
    /// Integration between systems
    Integration,
    /// Identity and access policy
    Iam,
    /// Semantic/ontology artifact
    Semantic,
    /// User interface
    Ui,
    /// Infrastructure
    Infra,
    /// Observability configuration
    Observability,
    /// Release definition
    Release,
    /// Configuration artifact
    Config,
    /// Documentation
    Docs,
    /// Metric definition
    Metric,
    /// Test suite
    Testing,
    /// AI model or prompt
    Ai,
    /// Device profile
    Device,
}

impl NodeKind {
    /// Every node kind, in declaration order.
    pub const ALL: [NodeKind; 19] = [
        Self::Api,
        Self::ApiEndpoint,
        Self::Data,
        Self::Event,
        Self::Workflow,
        Self::Agent,
        Self::Integration,
        Self::Iam,
        Self::Semantic,
        Self::Ui,
        Self::Infra,
        Self::Observability,
        Self::Release,
        Self::Config,
        Self::Docs,
        Self::Metric,
        Self::Testing,
        Self::Ai,
        Self::Device,
    ];

    /// Wire spelling of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::ApiEndpoint => "api-endpoint",
            Self::Data => "data",
            Self::Event => "event",
            Self::Workflow => "workflow",
            Self::Agent => "agent",
            Self::Integration => "integration",
            Self::Iam => "iam",
            Self::Semantic => "semantic",
            Self::Ui => "ui",
            Self::Infra => "infra",
            Self::Observability => "observability",
            Self::Release => "release",
            Self::Config => "config",
            Self::Docs => "docs",
            Self::Metric => "metric",
            Self::Testing => "testing",
            Self::Ai => "ai",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| Error::InvalidKind(s.to_string()))
    }
}

/// Relationship between two artifacts.
///
/// Edges point from the artifact that holds the relationship to the artifact
/// it refers to: `orders-api depends_on users-data` is `orders-api -> users-data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Source requires target to function
    DependsOn,
    /// Source emits target (typically an event)
    Produces,
    /// Source consumes target
    Consumes,
    /// Source reads from target
    ReadsFrom,
    /// Source writes to target
    WritesTo,
    /// Source exposes target to outside callers
    Exposes,
    /// Source is derived from target
    DerivesFrom,
}

impl EdgeKind {
    /// Every edge kind, in declaration order.
    pub const ALL: [EdgeKind; 7] = [
        Self::DependsOn,
        Self::Produces,
        Self::Consumes,
        Self::ReadsFrom,
        Self::WritesTo,
        Self::Exposes,
        Self::DerivesFrom,
    ];

    /// Wire spelling of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::Produces => "produces",
            Self::Consumes => "consumes",
            Self::ReadsFrom => "reads_from",
            Self::WritesTo => "writes_to",
            Self::Exposes => "exposes",
            Self::DerivesFrom => "derives_from",
        }
    }

    /// Edge kinds whose presence downstream makes a change externally visible.
    #[must_use]
    pub fn is_contract_bearing(&self) -> bool {
        matches!(self, Self::Exposes | Self::Produces | Self::DerivesFrom)
    }

    /// Edge kinds along which data moves between artifacts.
    #[must_use]
    pub fn carries_data(&self) -> bool {
        !matches!(self, Self::DependsOn)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| Error::InvalidEdgeKind(s.to_string()))
    }
}

/// Node weight stored in the graph arena.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Unique URN of the artifact
    pub urn: String,
    /// Artifact category
    pub kind: NodeKind,
    /// Artifact payload
    pub manifest: Manifest,
}

impl Node {
    /// Is this a stand-in created for a forward reference?
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.manifest.is_placeholder()
    }
}

/// Metadata keys that collide with the fixed fields of a serialized edge.
pub const RESERVED_EDGE_KEYS: [&str; 3] = ["from", "to", "kind"];

/// Edge weight stored in the graph arena.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    /// Relationship kind
    pub kind: EdgeKind,
    /// Free-form metadata attached by the manifest
    pub metadata: Map<String, Value>,
}

/// An edge as returned by graph accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeInfo {
    /// Source URN
    pub from: String,
    /// Target URN
    pub to: String,
    /// Relationship kind
    pub kind: EdgeKind,
    /// Free-form metadata
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("api", NodeKind::Api)]
    #[case("api-endpoint", NodeKind::ApiEndpoint)]
    #[case("api_endpoint", NodeKind::ApiEndpoint)]
    #[case("IAM", NodeKind::Iam)]
    #[case(" device ", NodeKind::Device)]
    fn node_kind_parses_wire_spelling(#[case] input: &str, #[case] expected: NodeKind) {
        assert_eq!(input.parse::<NodeKind>().unwrap(), expected);
    }

    #[test]
    fn unknown_node_kind_is_rejected() {
        let err = "spaceship".parse::<NodeKind>().unwrap_err();
        assert!(matches!(err, Error::InvalidKind(k) if k == "spaceship"));
    }

    #[test]
    fn node_kind_serde_matches_as_str() {
        for kind in NodeKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn edge_kind_round_trips_through_str() {
        for kind in EdgeKind::ALL {
            assert_eq!(kind.as_str().parse::<EdgeKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
        assert!(matches!(
            "calls".parse::<EdgeKind>(),
            Err(Error::InvalidEdgeKind(_))
        ));
    }

    #[test]
    fn contract_bearing_kinds() {
        assert!(EdgeKind::Exposes.is_contract_bearing());
        assert!(EdgeKind::Produces.is_contract_bearing());
        assert!(EdgeKind::DerivesFrom.is_contract_bearing());
        assert!(!EdgeKind::DependsOn.is_contract_bearing());
        assert!(!EdgeKind::ReadsFrom.is_contract_bearing());
    }

    #[test]
    fn edge_info_flattens_metadata() {
        let mut metadata = Map::new();
        metadata.insert("reason".to_string(), Value::from("billing"));
        let edge = EdgeInfo {
            from: "urn:proto:api:a/x".to_string(),
            to: "urn:proto:data:a/y".to_string(),
            kind: EdgeKind::ReadsFrom,
            metadata,
        };

        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["kind"], "reads_from");
        assert_eq!(json["reason"], "billing");
    }
}
