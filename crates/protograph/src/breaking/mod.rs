//! Breaking-change detection.
//!
//! Compares a proposed manifest against the one held by the graph and
//! combines the detected contract changes with the node's structural risk.
//!
//! Detection is pure: [`detect_changes`] takes two manifests and returns the
//! same [`ChangeSet`] for the same input, with codes as an ordered set and
//! details sorted by path.
//!
//! | Artifact | Compared |
//! |----------|----------|
//! | api      | endpoints, request and response schemas, top-level schema |
//! | data     | schema |
//! | event    | payload schema (type changes are `payload_structure_changed`) |
//! | other    | dependencies only |
//!
//! Dependencies are compared for every artifact type.

mod api;
mod schema;

use crate::domain::{ArtifactType, Manifest};
use crate::graph::ProtocolGraph;
use crate::impact::{RiskLevel, StructuralRisk};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// A detected contract change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakingChangeCode {
    /// A top-level required field was removed
    RemovedRequiredField,
    /// A top-level optional field was removed
    FieldRemoved,
    /// A field below the top level was removed
    NestedFieldRemoved,
    /// A field changed type
    FieldTypeChanged,
    /// An event payload field changed type
    PayloadStructureChanged,
    /// A field changed its `format`
    FormatChanged,
    /// A length, range or enum constraint became stricter
    ConstraintTightened,
    /// An endpoint (method and path) was removed
    EndpointRemoved,
    /// An endpoint stopped returning a status code
    ResponseCodeChanged,
    /// A declared dependency was removed
    DependencyRemoved,
    /// A declared dependency changed version
    DependencyVersionChanged,
    /// The artifact identity changed without a migration plan
    MigrationPlanMissing,
}

impl BreakingChangeCode {
    /// Wire spelling of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemovedRequiredField => "removed_required_field",
            Self::FieldRemoved => "field_removed",
            Self::NestedFieldRemoved => "nested_field_removed",
            Self::FieldTypeChanged => "field_type_changed",
            Self::PayloadStructureChanged => "payload_structure_changed",
            Self::FormatChanged => "format_changed",
            Self::ConstraintTightened => "constraint_tightened",
            Self::EndpointRemoved => "endpoint_removed",
            Self::ResponseCodeChanged => "response_code_changed",
            Self::DependencyRemoved => "dependency_removed",
            Self::DependencyVersionChanged => "dependency_version_changed",
            Self::MigrationPlanMissing => "migration_plan_missing",
        }
    }

    /// How serious the change is for consumers.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::FormatChanged | Self::ConstraintTightened | Self::DependencyVersionChanged => {
                Severity::Medium
            }
            _ => Severity::High,
        }
    }

    /// Does this change demand a migration plan when the identity changes?
    #[must_use]
    pub fn is_critical(&self) -> bool {
        !matches!(self, Self::FormatChanged)
    }
}

impl fmt::Display for BreakingChangeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a change code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// May break some consumers
    Medium,
    /// Breaks consumers relying on the removed or changed contract
    High,
}

/// One change with the location it was found at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ChangeDetail {
    /// Dotted path (`email`, `GET /users.200.email`, a dependency URN)
    pub path: String,
    /// Change code
    pub code: BreakingChangeCode,
    /// Human readable description
    pub message: String,
}

/// Changes found between two manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    codes: BTreeSet<BreakingChangeCode>,
    details: Vec<ChangeDetail>,
}

impl ChangeSet {
    pub(crate) fn push(&mut self, code: BreakingChangeCode, path: &str, message: String) {
        self.codes.insert(code);
        self.details.push(ChangeDetail {
            path: path.to_string(),
            code,
            message,
        });
    }

    fn finish(mut self) -> Self {
        self.details.sort();
        self.details.dedup();
        self
    }

    /// No changes found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Is `code` among the detected changes?
    #[must_use]
    pub fn contains(&self, code: BreakingChangeCode) -> bool {
        self.codes.contains(&code)
    }

    /// Distinct change codes in order.
    pub fn codes(&self) -> impl Iterator<Item = BreakingChangeCode> + '_ {
        self.codes.iter().copied()
    }

    /// Every change with its location, sorted by path.
    #[must_use]
    pub fn details(&self) -> &[ChangeDetail] {
        &self.details
    }

    /// Highest severity among the detected codes.
    #[must_use]
    pub fn severity(&self) -> Option<Severity> {
        self.codes.iter().map(BreakingChangeCode::severity).max()
    }
}

/// Compare two manifests of the given artifact type.
///
/// Identities are read from each manifest's `urn`/`id`; use
/// [`detect_changes_at`] when the original manifest may not declare one.
#[must_use]
pub fn detect_changes(original: &Manifest, updated: &Manifest, artifact: ArtifactType) -> ChangeSet {
    detect_changes_at(None, original, updated, artifact)
}

/// [`detect_changes`] for a manifest stored under `current_urn`.
///
/// `current_urn` stands in for the original identity when the original
/// manifest does not declare one.
#[must_use]
pub fn detect_changes_at(
    current_urn: Option<&str>,
    original: &Manifest,
    updated: &Manifest,
    artifact: ArtifactType,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    let type_code = match artifact {
        ArtifactType::Event => BreakingChangeCode::PayloadStructureChanged,
        _ => BreakingChangeCode::FieldTypeChanged,
    };
    if artifact != ArtifactType::Other {
        if let (Some(old), Some(new)) = (original.schema(), updated.schema()) {
            schema::compare_schema(old, new, "", type_code, &mut changes);
        }
    }
    if artifact == ArtifactType::Api {
        api::compare_endpoints(original, updated, &mut changes);
    }
    api::compare_dependencies(original, updated, &mut changes);

    let original_identity = original.identity_urn().or(current_urn);
    let identity_changed = match (original_identity, updated.identity_urn()) {
        (Some(old), Some(new)) => old != new,
        _ => false,
    };
    if identity_changed
        && !updated.has_migration_plan()
        && changes.codes().any(|code| code.is_critical())
    {
        changes.push(
            BreakingChangeCode::MigrationPlanMissing,
            "urn",
            "identity changed with breaking changes but no migration plan".to_string(),
        );
    }

    changes.finish()
}

/// Result of [`ProtocolGraph::assess_breaking_change_risk`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    /// Assessed URN
    pub urn: String,
    /// Whether the URN is in the graph
    pub exists: bool,
    /// Any contract change detected
    pub has_breaking_changes: bool,
    /// Overall risk label
    pub risk_level: RiskLevel,
    /// Overall risk score in 0..=100
    pub score: u32,
    /// Detected changes
    pub changes: ChangeSet,
    /// Consumers must migrate before the change can ship
    pub requires_migration: bool,
    /// The change can ship as-is
    pub approved: bool,
    /// Why the change was rejected
    pub reason: Option<String>,
    /// Topology-only component of the assessment
    pub structural: StructuralRisk,
}

impl ProtocolGraph {
    /// Assess the risk of replacing a node's manifest with `updated`.
    ///
    /// Without an updated manifest only the structural risk is reported.
    /// Any detected change rejects the update; high-severity changes raise
    /// the score to at least the configured high floor, medium-only changes
    /// to the medium floor.
    #[must_use]
    pub fn assess_breaking_change_risk(&self, urn: &str, updated: Option<&Manifest>) -> RiskAssessment {
        let urn = urn.trim();
        let structural = self.calculate_structural_risk(urn);

        let Some(node) = self.get_node(urn) else {
            return RiskAssessment {
                urn: urn.to_string(),
                exists: false,
                has_breaking_changes: false,
                risk_level: RiskLevel::None,
                score: 0,
                changes: ChangeSet::default(),
                requires_migration: false,
                approved: false,
                reason: Some(format!("artifact {urn} is not in the graph")),
                structural,
            };
        };

        let changes = match updated {
            Some(updated) => {
                let artifact = updated
                    .artifact_type()
                    .or_else(|| node.manifest.artifact_type())
                    .unwrap_or_else(|| ArtifactType::from_label(node.kind.as_str()));
                detect_changes_at(Some(node.urn.as_str()), &node.manifest, updated, artifact)
            }
            None => ChangeSet::default(),
        };

        let Some(severity) = changes.severity() else {
            return RiskAssessment {
                urn: urn.to_string(),
                exists: true,
                has_breaking_changes: false,
                risk_level: structural.level,
                score: structural.score,
                changes,
                requires_migration: false,
                approved: true,
                reason: None,
                structural,
            };
        };

        let risk = &self.config().risk;
        let (risk_level, floor) = match severity {
            Severity::High => (RiskLevel::High, risk.high_severity_floor),
            Severity::Medium => (RiskLevel::Medium, risk.medium_severity_floor),
        };
        let codes: Vec<&str> = changes.codes().map(|c| c.as_str()).collect();
        let reason = format!(
            "{} breaking change(s) detected: {}",
            changes.details().len(),
            codes.join(", ")
        );
        debug!(urn, codes = %codes.join(","), %risk_level, "breaking changes detected");

        RiskAssessment {
            urn: urn.to_string(),
            exists: true,
            has_breaking_changes: true,
            risk_level,
            score: structural.score.max(floor).min(100),
            changes,
            requires_migration: true,
            approved: false,
            reason: Some(reason),
            structural,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeKind, NodeKind};
    use serde_json::{json, Map, Value};

    fn data_manifest(urn: &str, required: &[&str], props: Value) -> Manifest {
        Manifest::new(json!({
            "urn": urn,
            "type": "data",
            "schema": { "type": "object", "required": required, "properties": props }
        }))
    }

    fn users_v1() -> Manifest {
        data_manifest(
            "urn:proto:data:acme/users@1.0.0",
            &["id"],
            json!({
                "id": { "type": "string" },
                "email": { "type": "string", "format": "email" }
            }),
        )
    }

    fn graph() -> ProtocolGraph {
        let mut graph = ProtocolGraph::new();
        graph
            .add_node("urn:proto:data:acme/users@1.0.0", NodeKind::Data, users_v1())
            .unwrap();
        graph
            .add_node("urn:proto:api:acme/orders@1.0.0", NodeKind::Api, Manifest::default())
            .unwrap();
        graph
            .add_edge(
                "urn:proto:api:acme/orders@1.0.0",
                EdgeKind::ReadsFrom,
                "urn:proto:data:acme/users@1.0.0",
                Map::new(),
            )
            .unwrap();
        graph
    }

    #[test]
    fn no_update_reports_structural_risk_only() {
        let assessment = graph().assess_breaking_change_risk("urn:proto:data:acme/users@1.0.0", None);
        assert!(assessment.exists);
        assert!(!assessment.has_breaking_changes);
        assert!(assessment.approved);
        assert_eq!(assessment.score, assessment.structural.score);
    }

    #[test]
    fn format_change_alone_is_medium() {
        let updated = data_manifest(
            "urn:proto:data:acme/users@1.0.0",
            &["id"],
            json!({
                "id": { "type": "string" },
                "email": { "type": "string", "format": "idn-email" }
            }),
        );
        let assessment =
            graph().assess_breaking_change_risk("urn:proto:data:acme/users@1.0.0", Some(&updated));

        assert_eq!(assessment.risk_level, RiskLevel::Medium);
        assert_eq!(assessment.score, 40);
        assert!(assessment.requires_migration);
        assert!(!assessment.approved);
    }

    #[test]
    fn identity_change_without_plan_adds_migration_code() {
        let updated = data_manifest(
            "urn:proto:data:acme/users@2.0.0",
            &["id"],
            json!({ "id": { "type": "string" } }),
        );
        let changes = detect_changes(&users_v1(), &updated, ArtifactType::Data);
        assert!(changes.contains(BreakingChangeCode::FieldRemoved));
        assert!(changes.contains(BreakingChangeCode::MigrationPlanMissing));

        let mut planned = updated.into_value();
        planned["migration"] = json!({ "steps": ["backfill email"] });
        let changes = detect_changes(&users_v1(), &Manifest::new(planned), ArtifactType::Data);
        assert!(!changes.contains(BreakingChangeCode::MigrationPlanMissing));
    }

    #[test]
    fn stored_urn_is_the_identity_of_a_manifest_without_one() {
        let urn = "urn:proto:data:acme/profiles@1.0.0";
        let mut graph = ProtocolGraph::new();
        graph
            .add_node(
                urn,
                NodeKind::Data,
                Manifest::new(json!({
                    "schema": {
                        "properties": {
                            "id": { "type": "string" },
                            "email": { "type": "string" }
                        }
                    }
                })),
            )
            .unwrap();
        let updated = data_manifest(
            "urn:proto:data:acme/profiles@2.0.0",
            &[],
            json!({ "id": { "type": "string" } }),
        );

        let assessment = graph.assess_breaking_change_risk(urn, Some(&updated));
        assert_eq!(
            assessment.changes.codes().collect::<Vec<_>>(),
            vec![
                BreakingChangeCode::FieldRemoved,
                BreakingChangeCode::MigrationPlanMissing,
            ]
        );

        let same_identity = data_manifest(urn, &[], json!({ "id": { "type": "string" } }));
        let assessment = graph.assess_breaking_change_risk(urn, Some(&same_identity));
        assert!(!assessment
            .changes
            .contains(BreakingChangeCode::MigrationPlanMissing));
    }

    #[test]
    fn identity_change_with_format_only_needs_no_plan() {
        let updated = data_manifest(
            "urn:proto:data:acme/users@1.1.0",
            &["id"],
            json!({
                "id": { "type": "string" },
                "email": { "type": "string", "format": "idn-email" }
            }),
        );
        let changes = detect_changes(&users_v1(), &updated, ArtifactType::Data);
        assert_eq!(
            changes.codes().collect::<Vec<_>>(),
            vec![BreakingChangeCode::FormatChanged]
        );
    }

    #[test]
    fn event_type_changes_use_payload_code() {
        let original = Manifest::new(json!({
            "type": "event",
            "payload": { "properties": { "at": { "type": "string" } } }
        }));
        let updated = Manifest::new(json!({
            "type": "event",
            "payload": { "properties": { "at": { "type": "integer" } } }
        }));
        let changes = detect_changes(&original, &updated, ArtifactType::Event);
        assert_eq!(
            changes.codes().collect::<Vec<_>>(),
            vec![BreakingChangeCode::PayloadStructureChanged]
        );
    }

    #[test]
    fn other_artifacts_only_compare_dependencies() {
        let original = Manifest::new(json!({
            "schema": { "properties": { "a": { "type": "string" } } },
            "dependencies": ["urn:proto:data:acme/users@1.0.0"]
        }));
        let updated = Manifest::new(json!({ "schema": { "properties": {} } }));
        let changes = detect_changes(&original, &updated, ArtifactType::Other);
        assert_eq!(
            changes.codes().collect::<Vec<_>>(),
            vec![BreakingChangeCode::DependencyRemoved]
        );
    }

    #[test]
    fn unknown_urn_is_not_approved() {
        let assessment = graph().assess_breaking_change_risk("urn:proto:data:acme/ghost", None);
        assert!(!assessment.exists);
        assert!(!assessment.approved);
        assert!(assessment.reason.is_some());
    }

    #[test]
    fn details_are_sorted_by_path() {
        let original = data_manifest(
            "urn:proto:data:acme/users@1.0.0",
            &[],
            json!({ "b": { "type": "string" }, "a": { "type": "string" } }),
        );
        let updated = data_manifest("urn:proto:data:acme/users@1.0.0", &[], json!({}));
        let changes = detect_changes(&original, &updated, ArtifactType::Data);
        let paths: Vec<&str> = changes.details().iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[test]
    fn severity_table() {
        assert_eq!(BreakingChangeCode::FormatChanged.severity(), Severity::Medium);
        assert_eq!(BreakingChangeCode::ConstraintTightened.severity(), Severity::Medium);
        assert_eq!(BreakingChangeCode::RemovedRequiredField.severity(), Severity::High);
        assert_eq!(BreakingChangeCode::MigrationPlanMissing.severity(), Severity::High);
        assert!(!BreakingChangeCode::FormatChanged.is_critical());
        assert!(BreakingChangeCode::ConstraintTightened.is_critical());
    }
}
