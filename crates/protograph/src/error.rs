//! Error types for protograph operations.
//!
//! Errors fall into two groups:
//!
//! - **`Error`**: rejections of a single operation (malformed identifiers,
//!   dangling edge endpoints, configuration and snapshot failures). The graph
//!   is never mutated when one of these is returned.
//! - **`BatchIssue`**: per-item problems collected during batch ingestion.
//!   A bad manifest is recorded and skipped so the rest of a directory still
//!   loads.
//!
//! Query absence (impact or risk on an unknown URN) is not an error at all;
//! those queries return a result with `exists: false`.

use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for protograph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for graph operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The URN does not match the `urn:proto:<category>:<path>` grammar.
    #[error("invalid URN: {0}")]
    InvalidUrn(String),

    /// The node kind is not a member of the node kind enumeration.
    #[error("invalid node kind: {0}")]
    InvalidKind(String),

    /// The edge kind is not a member of the edge kind enumeration.
    #[error("invalid edge kind: {0}")]
    InvalidEdgeKind(String),

    /// Edge metadata uses a key reserved for the edge's own fields.
    #[error("reserved edge metadata key: {0}")]
    ReservedMetadataKey(String),

    /// An edge endpoint is not present in the graph.
    #[error("unknown node: {urn} (edge {from} -> {to})")]
    UnknownNode {
        /// The missing endpoint
        urn: String,
        /// Edge source as requested
        from: String,
        /// Edge target as requested
        to: String,
    },

    /// A mutation targeted a node that does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A non-fatal problem recorded for one item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchIssue {
    /// Category of the problem
    #[serde(rename = "type")]
    pub issue_type: BatchIssueType,
    /// The input fields the problem refers to
    pub fields: Vec<String>,
    /// Human-readable message
    pub message: String,
}

impl BatchIssue {
    /// Create a new batch issue.
    #[must_use]
    pub fn new(
        issue_type: BatchIssueType,
        fields: &[&str],
        message: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            message: message.into(),
        }
    }

    /// Convert a rejected graph operation into a batch issue.
    #[must_use]
    pub fn from_error(error: &Error, fields: &[&str]) -> Self {
        let issue_type = match error {
            Error::InvalidUrn(_) => BatchIssueType::InvalidUrn,
            Error::InvalidKind(_) => BatchIssueType::InvalidKind,
            Error::InvalidEdgeKind(_) => BatchIssueType::InvalidEdgeKind,
            Error::ReservedMetadataKey(_) => BatchIssueType::InvalidMetadata,
            Error::UnknownNode { .. } | Error::NodeNotFound(_) => BatchIssueType::UnknownNode,
            Error::Config(_) | Error::Io(_) | Error::Json(_) => BatchIssueType::Internal,
        };
        Self::new(issue_type, fields, error.to_string())
    }
}

impl fmt::Display for BatchIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.issue_type,
            self.fields.join(", "),
            self.message
        )
    }
}

/// Categorization of batch issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchIssueType {
    // === Input problems (the manifest is wrong) ===
    /// A required field is absent from the input
    MissingField,
    /// The URN is malformed
    InvalidUrn,
    /// The node kind is unknown
    InvalidKind,
    /// The edge kind is unknown
    InvalidEdgeKind,
    /// Edge metadata uses a reserved key
    InvalidMetadata,

    // === Reference problems (the manifest set is incomplete) ===
    /// An edge endpoint is not in the graph
    UnknownNode,
    /// The URN is already present and was skipped
    DuplicateNode,

    // === Internal problems ===
    /// Unexpected failure inside the engine
    Internal,
}

impl fmt::Display for BatchIssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingField => "missing field",
            Self::InvalidUrn => "invalid URN",
            Self::InvalidKind => "invalid kind",
            Self::InvalidEdgeKind => "invalid edge kind",
            Self::InvalidMetadata => "invalid metadata",
            Self::UnknownNode => "unknown node",
            Self::DuplicateNode => "duplicate node",
            Self::Internal => "internal error",
        };
        f.write_str(s)
    }
}

impl BatchIssueType {
    /// Returns `true` if the manifest itself is malformed.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField
                | Self::InvalidUrn
                | Self::InvalidKind
                | Self::InvalidEdgeKind
                | Self::InvalidMetadata
        )
    }

    /// Returns `true` if the manifest is well-formed but references
    /// something the graph does not (yet) hold.
    #[must_use]
    pub fn is_reference_error(&self) -> bool {
        matches!(self, Self::UnknownNode | Self::DuplicateNode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_issue_type_categorization() {
        assert!(BatchIssueType::MissingField.is_input_error());
        assert!(BatchIssueType::InvalidEdgeKind.is_input_error());
        assert!(BatchIssueType::InvalidMetadata.is_input_error());
        assert!(!BatchIssueType::UnknownNode.is_input_error());

        assert!(BatchIssueType::UnknownNode.is_reference_error());
        assert!(BatchIssueType::DuplicateNode.is_reference_error());
        assert!(!BatchIssueType::Internal.is_reference_error());
    }

    #[test]
    fn from_error_maps_variant_to_issue_type() {
        let err = Error::InvalidUrn("nope".to_string());
        let issue = BatchIssue::from_error(&err, &["urn"]);

        assert_eq!(issue.issue_type, BatchIssueType::InvalidUrn);
        assert_eq!(issue.fields, vec!["urn".to_string()]);
        assert!(issue.message.contains("nope"));
    }

    #[test]
    fn batch_issue_display_includes_fields_and_message() {
        let issue = BatchIssue::new(
            BatchIssueType::UnknownNode,
            &["from", "to"],
            "edge target missing",
        );

        let display = issue.to_string();
        assert!(display.contains("unknown node"));
        assert!(display.contains("from, to"));
        assert!(display.contains("edge target missing"));
    }

    #[test]
    fn batch_issue_serializes_type_field() {
        let issue = BatchIssue::new(BatchIssueType::MissingField, &["urn"], "no urn");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "missing_field");
    }
}
