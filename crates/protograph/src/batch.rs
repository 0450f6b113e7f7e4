//! Batch ingestion and graph invariant validation.
//!
//! A batch is applied in two phases: every node first, then every edge, so
//! edges may refer to nodes declared later in the same batch. No single bad
//! item aborts a batch; problems are collected into the [`BatchReport`] as
//! errors (the item is malformed) or warnings (the item is well-formed but
//! could not be applied).

use crate::domain::{EdgeKind, Manifest, NodeKind};
use crate::error::{BatchIssue, BatchIssueType, Error};
use crate::graph::{self, ProtocolGraph};
use crate::urn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Kind given to placeholders whose URN category is not a node kind.
const FALLBACK_PLACEHOLDER_KIND: NodeKind = NodeKind::Config;

/// A node to ingest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInput {
    /// Node URN; taken from the manifest when absent
    pub urn: Option<String>,
    /// Node kind in wire spelling; taken from the manifest when absent
    pub kind: Option<String>,
    /// Artifact payload
    pub manifest: Manifest,
}

impl NodeInput {
    /// Input with an explicit URN and kind.
    #[must_use]
    pub fn new(urn: impl Into<String>, kind: NodeKind, manifest: Manifest) -> Self {
        Self {
            urn: Some(urn.into()),
            kind: Some(kind.to_string()),
            manifest,
        }
    }

    /// Input described entirely by a manifest document's `urn` and
    /// `kind` (or `type`) fields.
    #[must_use]
    pub fn from_manifest(value: Value) -> Self {
        let manifest = Manifest::new(value);
        Self {
            urn: manifest.identity_urn().map(str::to_string),
            kind: manifest.declared_kind().map(str::to_string),
            manifest,
        }
    }
}

/// An edge to ingest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeInput {
    /// Source URN
    pub from: String,
    /// Edge kind in wire spelling
    pub kind: String,
    /// Target URN
    pub to: String,
    /// Free-form metadata
    pub metadata: Map<String, Value>,
}

impl EdgeInput {
    /// Edge input without metadata.
    #[must_use]
    pub fn new(from: impl Into<String>, kind: EdgeKind, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            kind: kind.to_string(),
            to: to.into(),
            metadata: Map::new(),
        }
    }
}

/// Nodes and edges applied together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchUpdate {
    /// Nodes, applied first
    pub nodes: Vec<NodeInput>,
    /// Edges, applied after every node
    pub edges: Vec<EdgeInput>,
}

/// Outcome of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Nodes inserted
    pub nodes_added: usize,
    /// Node inputs not inserted (duplicates and invalid inputs)
    pub nodes_skipped: usize,
    /// Edges inserted
    pub edges_added: usize,
    /// Edge inputs not inserted
    pub edges_skipped: usize,
    /// Placeholder nodes created for missing edge endpoints
    pub placeholders_created: usize,
    /// Placeholder nodes replaced by a real manifest
    pub placeholders_promoted: usize,
    /// Malformed inputs
    pub errors: Vec<BatchIssue>,
    /// Well-formed inputs that could not be applied
    pub warnings: Vec<BatchIssue>,
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// Wall time spent applying the batch
    pub duration: Duration,
    /// `duration` divided by the number of node inputs
    pub average_per_node: Duration,
}

impl BatchReport {
    fn start() -> Self {
        Self {
            nodes_added: 0,
            nodes_skipped: 0,
            edges_added: 0,
            edges_skipped: 0,
            placeholders_created: 0,
            placeholders_promoted: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            average_per_node: Duration::ZERO,
        }
    }

    /// Returns `true` if no errors were recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, issue: BatchIssue) {
        debug!(%issue, "batch item rejected");
        self.errors.push(issue);
    }

    fn warning(&mut self, issue: BatchIssue) {
        debug!(%issue, "batch item skipped");
        self.warnings.push(issue);
    }
}

/// Options for [`ProtocolGraph::validate_invariants`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvariantOptions {
    /// Accept circular dependencies instead of reporting them
    pub allow_cycles: bool,
}

/// Category of an invariant violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A circular dependency
    Cycle,
    /// A placeholder that never received its manifest
    Placeholder,
    /// Derived indices disagree with the node set
    Index,
}

/// One invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Category
    pub kind: ViolationKind,
    /// URNs involved, sorted
    pub urns: Vec<String>,
    /// Human readable description
    pub message: String,
}

/// Outcome of [`ProtocolGraph::validate_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantReport {
    /// Violations that make the graph invalid
    pub errors: Vec<Violation>,
    /// Violations that are tolerated
    pub warnings: Vec<Violation>,
    /// Total cycles found (0 when cycles are allowed)
    pub cycle_count: usize,
    /// Total placeholder nodes
    pub placeholder_count: usize,
}

impl InvariantReport {
    /// Returns `true` if no errors were recorded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ProtocolGraph {
    /// Apply a batch. Edges with a missing endpoint are skipped with a
    /// warning.
    pub fn apply_batch(&mut self, batch: BatchUpdate) -> BatchReport {
        self.apply(batch, false)
    }

    /// Apply a batch, creating a placeholder node for every missing edge
    /// endpoint with a valid URN.
    pub fn apply_batch_with_placeholders(&mut self, batch: BatchUpdate) -> BatchReport {
        self.apply(batch, true)
    }

    /// Check graph-wide invariants.
    ///
    /// Cycles are errors unless allowed; residual placeholders are warnings.
    /// Listings are capped by the invariant configuration.
    #[must_use]
    pub fn validate_invariants(&self, options: InvariantOptions) -> InvariantReport {
        let limits = &self.config().invariants;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut cycle_count = 0;
        if !options.allow_cycles {
            let cycles = self.detect_cycles();
            cycle_count = cycles.len();
            for cycle in cycles.iter().take(limits.max_reported_cycles) {
                errors.push(Violation {
                    kind: ViolationKind::Cycle,
                    urns: cycle.members.clone(),
                    message: format!("circular dependency: {}", cycle.members.join(" -> ")),
                });
            }
            if cycle_count > limits.max_reported_cycles {
                errors.push(Violation {
                    kind: ViolationKind::Cycle,
                    urns: Vec::new(),
                    message: format!(
                        "{} more cycles not listed",
                        cycle_count - limits.max_reported_cycles
                    ),
                });
            }
        }

        let placeholders = self.placeholders();
        let placeholder_count = placeholders.len();
        if placeholder_count > 0 {
            let listed: Vec<String> = placeholders
                .into_iter()
                .take(limits.max_reported_placeholders)
                .collect();
            let more = placeholder_count - listed.len();
            let mut message = format!("{placeholder_count} placeholder node(s) await a manifest");
            if more > 0 {
                message.push_str(&format!(" ({more} not listed)"));
            }
            warnings.push(Violation {
                kind: ViolationKind::Placeholder,
                urns: listed,
                message,
            });
        }

        for problem in self.index_problems() {
            errors.push(Violation {
                kind: ViolationKind::Index,
                urns: Vec::new(),
                message: problem,
            });
        }

        let report = InvariantReport {
            errors,
            warnings,
            cycle_count,
            placeholder_count,
        };
        if !report.is_valid() {
            warn!(
                errors = report.errors.len(),
                cycles = cycle_count,
                "graph invariants violated"
            );
        }
        report
    }

    fn apply(&mut self, batch: BatchUpdate, placeholders: bool) -> BatchReport {
        let mut report = BatchReport::start();
        let timer = Instant::now();
        let node_inputs = batch.nodes.len();

        for input in batch.nodes {
            self.ingest_node(input, &mut report);
        }
        for input in batch.edges {
            self.ingest_edge(input, placeholders, &mut report);
        }

        report.duration = timer.elapsed();
        report.average_per_node = u32::try_from(node_inputs.max(1))
            .ok()
            .and_then(|n| report.duration.checked_div(n))
            .unwrap_or(Duration::ZERO);

        info!(
            nodes_added = report.nodes_added,
            nodes_skipped = report.nodes_skipped,
            edges_added = report.edges_added,
            edges_skipped = report.edges_skipped,
            placeholders = report.placeholders_created,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            elapsed_ms = report.duration.as_millis(),
            "batch applied"
        );
        report
    }

    fn ingest_node(&mut self, input: NodeInput, report: &mut BatchReport) {
        let urn = input
            .urn
            .as_deref()
            .or_else(|| input.manifest.identity_urn())
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let Some(urn) = urn else {
            report.nodes_skipped += 1;
            report.error(BatchIssue::new(
                BatchIssueType::MissingField,
                &["urn"],
                "node input has no URN",
            ));
            return;
        };

        let label = input
            .kind
            .as_deref()
            .or_else(|| input.manifest.declared_kind())
            .map(str::to_string);
        let Some(label) = label else {
            report.nodes_skipped += 1;
            report.error(BatchIssue::new(
                BatchIssueType::MissingField,
                &["kind"],
                format!("node {urn} has no kind"),
            ));
            return;
        };
        let kind: NodeKind = match label.parse() {
            Ok(kind) => kind,
            Err(err) => {
                report.nodes_skipped += 1;
                report.error(BatchIssue::from_error(&err, &["kind"]));
                return;
            }
        };

        if let Some(existing) = self.get_node(&urn) {
            if existing.is_placeholder() && !input.manifest.is_placeholder() {
                match self.replace_node(&urn, kind, input.manifest) {
                    Ok(()) => report.placeholders_promoted += 1,
                    Err(err) => report.error(BatchIssue::from_error(&err, &["urn"])),
                }
            } else {
                report.nodes_skipped += 1;
                report.warning(BatchIssue::new(
                    BatchIssueType::DuplicateNode,
                    &["urn"],
                    format!("node {urn} already exists"),
                ));
            }
            return;
        }

        match self.add_node(&urn, kind, input.manifest) {
            Ok(_) => report.nodes_added += 1,
            Err(err) => {
                report.nodes_skipped += 1;
                report.error(BatchIssue::from_error(&err, &["urn"]));
            }
        }
    }

    fn ingest_edge(&mut self, input: EdgeInput, placeholders: bool, report: &mut BatchReport) {
        let kind: EdgeKind = match input.kind.parse() {
            Ok(kind) => kind,
            Err(err) => {
                report.edges_skipped += 1;
                report.error(BatchIssue::from_error(&err, &["kind"]));
                return;
            }
        };

        for (field, endpoint) in [("from", &input.from), ("to", &input.to)] {
            if !urn::is_valid(endpoint) {
                report.edges_skipped += 1;
                report.error(BatchIssue::from_error(
                    &Error::InvalidUrn(endpoint.clone()),
                    &[field],
                ));
                return;
            }
        }

        if let Err(err) = graph::check_edge_metadata(&input.metadata) {
            report.edges_skipped += 1;
            report.error(BatchIssue::from_error(&err, &["metadata"]));
            return;
        }

        for (field, endpoint) in [("from", &input.from), ("to", &input.to)] {
            if self.contains(endpoint) {
                continue;
            }
            if placeholders && self.create_placeholder(endpoint, report) {
                continue;
            }
            report.edges_skipped += 1;
            report.warning(BatchIssue::new(
                BatchIssueType::UnknownNode,
                &[field],
                format!(
                    "edge {} -[{kind}]-> {} skipped: {endpoint} is not in the graph",
                    input.from, input.to
                ),
            ));
            return;
        }

        match self.add_edge(&input.from, kind, &input.to, input.metadata) {
            Ok(()) => report.edges_added += 1,
            Err(err) => {
                report.edges_skipped += 1;
                report.warning(BatchIssue::from_error(&err, &["from", "to"]));
            }
        }
    }

    fn create_placeholder(&mut self, endpoint: &str, report: &mut BatchReport) -> bool {
        let kind = urn::parse(endpoint)
            .and_then(|parsed| parsed.category.parse::<NodeKind>().ok())
            .unwrap_or(FALLBACK_PLACEHOLDER_KIND);
        match self.add_node(endpoint, kind, Manifest::placeholder(endpoint.trim())) {
            Ok(_) => {
                report.placeholders_created += 1;
                debug!(urn = endpoint, %kind, "placeholder created");
                true
            }
            Err(err) => {
                report.error(BatchIssue::from_error(&err, &["urn"]));
                false
            }
        }
    }
}
