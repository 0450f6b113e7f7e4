//! Recursive JSON schema comparison.
//!
//! Starts at the root schema, then walks `properties` of the original,
//! descending into nested object properties and `items`. Only changes that
//! can break an existing consumer are reported; additions are ignored unless
//! they tighten a constraint.

use super::{BreakingChangeCode, ChangeSet};
use serde_json::Value;

/// Upper bounds: lowering them, or introducing them, is breaking.
const UPPER_BOUNDS: [&str; 3] = ["maxLength", "maximum", "maxItems"];
/// Lower bounds: raising them, or introducing them, is breaking.
const LOWER_BOUNDS: [&str; 3] = ["minLength", "minimum", "minItems"];
/// Detail path reported for the root schema itself.
const ROOT_PATH: &str = "$";

/// Compare two root schemas.
///
/// The root is treated like any property: its `type`, `format` and
/// constraints are compared before its `properties` and `items`. Fields of
/// the root object, and of the item object of a root array, are top-level
/// and classified by their `required` list. `type_code` is the code emitted
/// when a type changes.
pub(crate) fn compare_schema(
    original: &Value,
    updated: &Value,
    prefix: &str,
    type_code: BreakingChangeCode,
    changes: &mut ChangeSet,
) {
    compare_property(original, updated, prefix, 0, type_code, changes);
}

/// Compare the properties of two object schemas.
///
/// `depth` is the nesting level of the properties being compared; removals
/// at depth 0 are classified by the `required` list, deeper removals are
/// always [`BreakingChangeCode::NestedFieldRemoved`].
fn compare_object(
    original: &Value,
    updated: &Value,
    prefix: &str,
    depth: usize,
    type_code: BreakingChangeCode,
    changes: &mut ChangeSet,
) {
    let Some(old_props) = original.get("properties").and_then(Value::as_object) else {
        return;
    };
    let new_props = updated.get("properties").and_then(Value::as_object);
    let required = required_fields(original);

    for (name, old_prop) in old_props {
        let path = join(prefix, name);
        match new_props.and_then(|props| props.get(name)) {
            None => {
                let code = if depth > 0 {
                    BreakingChangeCode::NestedFieldRemoved
                } else if required.contains(&name.as_str()) {
                    BreakingChangeCode::RemovedRequiredField
                } else {
                    BreakingChangeCode::FieldRemoved
                };
                changes.push(code, &path, format!("field '{path}' was removed"));
            }
            Some(new_prop) => {
                compare_property(old_prop, new_prop, &path, depth + 1, type_code, changes);
            }
        }
    }
}

/// Compare one schema node, recursing into objects and arrays.
///
/// `depth` is the nesting level of this node's own properties.
fn compare_property(
    original: &Value,
    updated: &Value,
    path: &str,
    depth: usize,
    type_code: BreakingChangeCode,
    changes: &mut ChangeSet,
) {
    let label = if path.is_empty() { ROOT_PATH } else { path };

    let old_type = original.get("type");
    if old_type.is_some() && old_type != updated.get("type") {
        changes.push(
            type_code,
            label,
            format!(
                "type of '{label}' changed from {} to {}",
                describe(old_type),
                describe(updated.get("type"))
            ),
        );
        // Nested comparison is meaningless once the shape changed
        return;
    }

    // A dropped format only loosens the contract
    let new_format = updated.get("format");
    if new_format.is_some() && original.get("format") != new_format {
        changes.push(
            BreakingChangeCode::FormatChanged,
            label,
            format!(
                "format of '{label}' changed from {} to {}",
                describe(original.get("format")),
                describe(new_format)
            ),
        );
    }

    compare_constraints(original, updated, label, changes);

    compare_object(original, updated, path, depth, type_code, changes);

    if let (Some(old_items), Some(new_items)) = (original.get("items"), updated.get("items")) {
        compare_property(old_items, new_items, &format!("{path}[]"), depth, type_code, changes);
    }
}

fn compare_constraints(original: &Value, updated: &Value, path: &str, changes: &mut ChangeSet) {
    for key in UPPER_BOUNDS {
        let old = original.get(key).and_then(Value::as_f64);
        let new = updated.get(key).and_then(Value::as_f64);
        let tightened = match (old, new) {
            (Some(old), Some(new)) => new < old,
            (None, Some(_)) => true,
            _ => false,
        };
        if tightened {
            changes.push(
                BreakingChangeCode::ConstraintTightened,
                path,
                format!("{key} of '{path}' tightened to {}", describe(updated.get(key))),
            );
        }
    }

    for key in LOWER_BOUNDS {
        let old = original.get(key).and_then(Value::as_f64);
        let new = updated.get(key).and_then(Value::as_f64);
        let tightened = match (old, new) {
            (Some(old), Some(new)) => new > old,
            (None, Some(_)) => true,
            _ => false,
        };
        if tightened {
            changes.push(
                BreakingChangeCode::ConstraintTightened,
                path,
                format!("{key} of '{path}' tightened to {}", describe(updated.get(key))),
            );
        }
    }

    let old_enum = original.get("enum").and_then(Value::as_array);
    let new_enum = updated.get("enum").and_then(Value::as_array);
    match (old_enum, new_enum) {
        (Some(old), Some(new)) => {
            let dropped: Vec<String> = old
                .iter()
                .filter(|value| !new.contains(value))
                .map(ToString::to_string)
                .collect();
            if !dropped.is_empty() {
                changes.push(
                    BreakingChangeCode::ConstraintTightened,
                    path,
                    format!("enum of '{path}' no longer allows {}", dropped.join(", ")),
                );
            }
        }
        (None, Some(_)) => changes.push(
            BreakingChangeCode::ConstraintTightened,
            path,
            format!("enum restriction added to '{path}'"),
        ),
        _ => {}
    }
}

fn required_fields(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

pub(crate) fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "none".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn diff(original: &Value, updated: &Value) -> ChangeSet {
        let mut changes = ChangeSet::default();
        compare_schema(
            original,
            updated,
            "",
            BreakingChangeCode::FieldTypeChanged,
            &mut changes,
        );
        changes
    }

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "email"],
            "properties": {
                "id": { "type": "string" },
                "email": { "type": "string", "format": "email" },
                "nickname": { "type": "string" },
                "address": {
                    "type": "object",
                    "properties": {
                        "street": { "type": "string" },
                        "zip": { "type": "string", "maxLength": 10 }
                    }
                },
                "tags": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "label": { "type": "string" } }
                    }
                }
            }
        })
    }

    fn without(mut schema: Value, pointer: &str, field: &str) -> Value {
        schema
            .pointer_mut(pointer)
            .and_then(Value::as_object_mut)
            .unwrap()
            .remove(field);
        schema
    }

    #[test]
    fn identical_schemas_have_no_changes() {
        assert!(diff(&user_schema(), &user_schema()).is_empty());
    }

    #[rstest]
    #[case::required("/properties", "email", BreakingChangeCode::RemovedRequiredField, "email")]
    #[case::optional("/properties", "nickname", BreakingChangeCode::FieldRemoved, "nickname")]
    #[case::nested(
        "/properties/address/properties",
        "street",
        BreakingChangeCode::NestedFieldRemoved,
        "address.street"
    )]
    #[case::array_item(
        "/properties/tags/items/properties",
        "label",
        BreakingChangeCode::NestedFieldRemoved,
        "tags[].label"
    )]
    fn field_removal_is_classified_by_position(
        #[case] pointer: &str,
        #[case] field: &str,
        #[case] expected: BreakingChangeCode,
        #[case] path: &str,
    ) {
        let changes = diff(&user_schema(), &without(user_schema(), pointer, field));
        assert_eq!(changes.codes().collect::<Vec<_>>(), vec![expected]);
        assert_eq!(changes.details()[0].path, path);
    }

    #[test]
    fn type_change_uses_the_supplied_code() {
        let mut updated = user_schema();
        updated["properties"]["id"]["type"] = json!("integer");

        let mut changes = ChangeSet::default();
        compare_schema(
            &user_schema(),
            &updated,
            "",
            BreakingChangeCode::PayloadStructureChanged,
            &mut changes,
        );
        assert!(changes.contains(BreakingChangeCode::PayloadStructureChanged));
        assert!(!changes.contains(BreakingChangeCode::FieldTypeChanged));
    }

    #[rstest]
    #[case::changed(json!({ "format": "email" }), json!({ "format": "idn-email" }), true)]
    #[case::added(json!({}), json!({ "format": "uuid" }), true)]
    #[case::dropped(json!({ "format": "email" }), json!({}), false)]
    #[case::unchanged(json!({ "format": "email" }), json!({ "format": "email" }), false)]
    fn format_changes(#[case] old: Value, #[case] new: Value, #[case] reported: bool) {
        let original = json!({ "properties": { "f": old } });
        let updated = json!({ "properties": { "f": new } });
        assert_eq!(
            diff(&original, &updated).contains(BreakingChangeCode::FormatChanged),
            reported
        );
    }

    #[test]
    fn array_root_items_are_top_level_fields() {
        let original = json!({ "type": "array", "items": user_schema() });
        let updated = json!({
            "type": "array",
            "items": without(user_schema(), "/properties", "email")
        });

        let changes = diff(&original, &updated);
        assert_eq!(
            changes.codes().collect::<Vec<_>>(),
            vec![BreakingChangeCode::RemovedRequiredField]
        );
        assert_eq!(changes.details()[0].path, "[].email");
    }

    #[test]
    fn root_type_change_is_reported_at_the_root() {
        let updated = json!({ "type": "array", "items": user_schema() });

        let changes = diff(&user_schema(), &updated);
        assert_eq!(
            changes.codes().collect::<Vec<_>>(),
            vec![BreakingChangeCode::FieldTypeChanged]
        );
        assert_eq!(changes.details()[0].path, "$");
    }

    #[test]
    fn prefixed_root_reports_its_prefix() {
        let mut changes = ChangeSet::default();
        compare_schema(
            &json!({ "type": "object" }),
            &json!({ "type": "string" }),
            "GET /users.200",
            BreakingChangeCode::FieldTypeChanged,
            &mut changes,
        );
        assert_eq!(changes.details()[0].path, "GET /users.200");
    }

    #[rstest]
    #[case::lower_max_length(json!({ "maxLength": 10 }), json!({ "maxLength": 5 }), true)]
    #[case::raise_max_length(json!({ "maxLength": 10 }), json!({ "maxLength": 20 }), false)]
    #[case::raise_minimum(json!({ "minimum": 0 }), json!({ "minimum": 1 }), true)]
    #[case::new_bound(json!({}), json!({ "maximum": 100 }), true)]
    #[case::dropped_bound(json!({ "maximum": 100 }), json!({}), false)]
    #[case::enum_shrunk(json!({ "enum": ["a", "b"] }), json!({ "enum": ["a"] }), true)]
    #[case::enum_grown(json!({ "enum": ["a"] }), json!({ "enum": ["a", "b"] }), false)]
    #[case::enum_added(json!({}), json!({ "enum": ["a"] }), true)]
    fn constraint_changes(#[case] old: Value, #[case] new: Value, #[case] tightened: bool) {
        let original = json!({ "properties": { "f": old } });
        let updated = json!({ "properties": { "f": new } });
        assert_eq!(
            diff(&original, &updated).contains(BreakingChangeCode::ConstraintTightened),
            tightened
        );
    }

    #[test]
    fn added_fields_are_not_breaking() {
        let mut updated = user_schema();
        updated["properties"]["phone"] = json!({ "type": "string" });
        assert!(diff(&user_schema(), &updated).is_empty());
    }
}
