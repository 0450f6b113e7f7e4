//! Endpoint catalog and dependency comparison.

use super::schema::{self, join};
use super::{BreakingChangeCode, ChangeSet};
use crate::domain::Manifest;
use crate::urn;
use std::collections::HashMap;

/// Compare the endpoint catalogs of two API manifests.
///
/// Endpoints are matched by method and path. Request schemas and the schema
/// of every surviving response status are compared field by field.
pub(crate) fn compare_endpoints(original: &Manifest, updated: &Manifest, changes: &mut ChangeSet) {
    let updated_endpoints = updated.endpoints();
    let by_key: HashMap<String, _> = updated_endpoints.iter().map(|e| (e.key(), e)).collect();

    for old in original.endpoints() {
        let key = old.key();
        let Some(new) = by_key.get(&key) else {
            changes.push(
                BreakingChangeCode::EndpointRemoved,
                &key,
                format!("endpoint {key} was removed"),
            );
            continue;
        };

        if let (Some(old_request), Some(new_request)) = (old.request_schema, new.request_schema) {
            schema::compare_schema(
                old_request,
                new_request,
                &join(&key, "request"),
                BreakingChangeCode::FieldTypeChanged,
                changes,
            );
        }

        for (status, old_schema) in &old.responses {
            let path = join(&key, status);
            let Some(new_schema) = new.responses.get(status) else {
                changes.push(
                    BreakingChangeCode::ResponseCodeChanged,
                    &path,
                    format!("endpoint {key} no longer returns {status}"),
                );
                continue;
            };
            if let (Some(old_schema), Some(new_schema)) = (old_schema, new_schema) {
                schema::compare_schema(
                    old_schema,
                    new_schema,
                    &path,
                    BreakingChangeCode::FieldTypeChanged,
                    changes,
                );
            }
        }
    }
}

/// Compare declared dependencies by identity, then by version.
pub(crate) fn compare_dependencies(original: &Manifest, updated: &Manifest, changes: &mut ChangeSet) {
    let current: HashMap<String, Option<String>> = updated
        .dependencies()
        .iter()
        .map(|dep| urn::split_version(dep))
        .collect();

    for dep in original.dependencies() {
        let (base, version) = urn::split_version(&dep);
        match current.get(&base) {
            None => changes.push(
                BreakingChangeCode::DependencyRemoved,
                &base,
                format!("dependency {dep} was removed"),
            ),
            Some(new_version) if *new_version != version => changes.push(
                BreakingChangeCode::DependencyVersionChanged,
                &base,
                format!(
                    "dependency {base} moved from {} to {}",
                    version.as_deref().unwrap_or("unversioned"),
                    new_version.as_deref().unwrap_or("unversioned")
                ),
            ),
            Some(_) => {}
        }
    }
}
