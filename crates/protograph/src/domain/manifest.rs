//! Typed access to artifact manifests.
//!
//! Manifests are open JSON documents whose shape depends on the artifact
//! category. Rather than letting `serde_json::Value` lookups spread through
//! the engine, every field the engine cares about is read through an
//! accessor here. Accessors accept the common layouts seen in manifest
//! directories:
//!
//! - schema at `schema`, `spec.schema`, or for events `payload.schema`,
//!   `payload`, `spec.payload`
//! - endpoints at `endpoints`, `spec.endpoints`, or `catalog.endpoints`
//! - dependencies at `dependencies` or `spec.dependencies`, as URN strings or
//!   `{ "urn": ... }` objects

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Artifact type that selects the schema comparison strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Endpoint catalog with request/response schemas
    Api,
    /// Data schema
    Data,
    /// Event payload schema
    Event,
    /// Any other category; only dependencies are compared
    Other,
}

impl ArtifactType {
    /// Map a `type`/`kind` string onto an artifact type.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "api" | "api-endpoint" | "api_endpoint" => Self::Api,
            "data" => Self::Data,
            "event" => Self::Event,
            _ => Self::Other,
        }
    }
}

/// Artifact payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Value);

/// One endpoint of an API manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint<'a> {
    /// Upper-cased HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Request body schema, if declared
    pub request_schema: Option<&'a Value>,
    /// Response schemas keyed by status code
    pub responses: BTreeMap<String, Option<&'a Value>>,
}

impl Endpoint<'_> {
    /// Identity of the endpoint within its API (`GET /orders`).
    #[must_use]
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl Manifest {
    /// Wrap a JSON document.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Minimal stand-in for an artifact whose manifest has not been ingested.
    #[must_use]
    pub fn placeholder(urn: &str) -> Self {
        Self(json!({ "urn": urn, "placeholder": true }))
    }

    /// The raw document.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwrap into the raw document.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Is this a placeholder created for a forward reference?
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.get("placeholder").and_then(Value::as_bool) == Some(true)
    }

    /// URN the manifest declares for itself.
    #[must_use]
    pub fn identity_urn(&self) -> Option<&str> {
        self.first(&["/urn", "/metadata/urn", "/id"])
            .and_then(Value::as_str)
    }

    /// Declared `kind`, falling back to `type`.
    #[must_use]
    pub fn declared_kind(&self) -> Option<&str> {
        self.first(&["/kind", "/type", "/metadata/kind"])
            .and_then(Value::as_str)
    }

    /// Artifact type from `type`/`kind`, or `None` if neither is declared.
    #[must_use]
    pub fn artifact_type(&self) -> Option<ArtifactType> {
        self.first(&["/type", "/kind", "/spec/type"])
            .and_then(Value::as_str)
            .map(ArtifactType::from_label)
    }

    /// Top-level schema of a data or event artifact.
    #[must_use]
    pub fn schema(&self) -> Option<&Value> {
        self.first(&[
            "/schema",
            "/spec/schema",
            "/payload/schema",
            "/spec/payload/schema",
            "/payload",
            "/spec/payload",
        ])
        .filter(|v| v.is_object())
    }

    /// Endpoints of an API artifact.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint<'_>> {
        let Some(list) = self
            .first(&["/endpoints", "/spec/endpoints", "/catalog/endpoints"])
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        list.iter().filter_map(parse_endpoint).collect()
    }

    /// URNs this artifact declares as dependencies.
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        let Some(list) = self
            .first(&["/dependencies", "/spec/dependencies"])
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|dep| match dep {
                Value::String(urn) => Some(urn.clone()),
                Value::Object(obj) => obj.get("urn").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }

    /// Does the manifest carry a migration plan or an explicit marker
    /// acknowledging the breaking change?
    #[must_use]
    pub fn has_migration_plan(&self) -> bool {
        let plan = self.first(&[
            "/migration",
            "/migration_plan",
            "/migrationPlan",
            "/metadata/migration",
            "/metadata/migration_plan",
            "/metadata/migrationPlan",
        ]);
        let marker = self.first(&[
            "/metadata/breaking_change_acknowledged",
            "/metadata/breakingChangeAcknowledged",
        ]);
        plan.is_some_and(|v| !v.is_null() && v != &Value::Bool(false))
            || marker.and_then(Value::as_bool) == Some(true)
    }

    /// Dotted paths of schema fields flagged as personal data.
    #[must_use]
    pub fn pii_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if let Some(schema) = self.schema() {
            collect_pii(schema, "", &mut fields);
        }
        for endpoint in self.endpoints() {
            for (status, schema) in &endpoint.responses {
                if let Some(schema) = schema {
                    let prefix = format!("{}.{status}", endpoint.key());
                    collect_pii(schema, &prefix, &mut fields);
                }
            }
        }
        fields.sort();
        fields.dedup();
        fields
    }

    fn first(&self, pointers: &[&str]) -> Option<&Value> {
        pointers.iter().find_map(|p| self.0.pointer(p))
    }
}

impl From<Value> for Manifest {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn parse_endpoint(value: &Value) -> Option<Endpoint<'_>> {
    let path = value.get("path").and_then(Value::as_str)?;
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_ascii_uppercase();

    let request_schema = ["/request/schema", "/requestBody/schema", "/request_body/schema", "/request"]
        .iter()
        .find_map(|p| value.pointer(p))
        .filter(|v| v.get("properties").is_some() || v.get("type").is_some());

    let mut responses = BTreeMap::new();
    match value.get("responses") {
        Some(Value::Array(list)) => {
            for response in list {
                if let Some(status) = response.get("status").and_then(status_key) {
                    responses.insert(status, response.get("schema"));
                }
            }
        }
        Some(Value::Object(map)) => {
            for (status, response) in map {
                let schema = response.get("schema").or_else(|| {
                    (response.get("properties").is_some() || response.get("type").is_some())
                        .then_some(response)
                });
                responses.insert(status.clone(), schema);
            }
        }
        _ => {}
    }

    Some(Endpoint {
        method,
        path: path.to_string(),
        request_schema,
        responses,
    })
}

fn status_key(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn is_pii_flagged(schema: &Value) -> bool {
    schema.get("pii").and_then(Value::as_bool) == Some(true)
        || schema.get("x-pii").and_then(Value::as_bool) == Some(true)
        || schema
            .get("classification")
            .and_then(Value::as_str)
            .is_some_and(|c| c.eq_ignore_ascii_case("pii"))
}

fn collect_pii(schema: &Value, prefix: &str, out: &mut Vec<String>) {
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            if is_pii_flagged(prop) {
                out.push(path.clone());
            }
            collect_pii(prop, &path, out);
        }
    }
    if let Some(items) = schema.get("items") {
        let path = format!("{prefix}[]");
        collect_pii(items, &path, out);
    }
}
