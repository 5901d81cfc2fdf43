//! JSON merge patch computation and application
//!
//! The reconciliation client patches live objects with a merge patch computed
//! from the previously rendered document to the target document (RFC 7386
//! semantics): keys absent from the target become explicit nulls, nested
//! objects recurse, arrays and scalars are replaced wholesale. An empty patch
//! means the documents are equivalent and no request needs to be issued.

use serde_json::{Map, Value as JsonValue};

/// Compute the merge patch that turns `original` into `target`
pub fn merge_patch(original: &JsonValue, target: &JsonValue) -> JsonValue {
    match (original, target) {
        (JsonValue::Object(original_map), JsonValue::Object(target_map)) => {
            let mut patch = Map::new();

            for (key, target_value) in target_map {
                match original_map.get(key) {
                    Some(original_value) if original_value == target_value => {}
                    Some(original_value) => {
                        patch.insert(key.clone(), merge_patch(original_value, target_value));
                    }
                    None => {
                        patch.insert(key.clone(), target_value.clone());
                    }
                }
            }

            for key in original_map.keys() {
                if !target_map.contains_key(key) {
                    patch.insert(key.clone(), JsonValue::Null);
                }
            }

            JsonValue::Object(patch)
        }
        // Non-object targets replace wholesale
        _ => target.clone(),
    }
}

/// Apply a merge patch to a value in place
pub fn apply_merge_patch(base: &mut JsonValue, patch: &JsonValue) {
    match patch {
        JsonValue::Object(patch_map) => {
            if !base.is_object() {
                *base = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(base_map) = base {
                for (key, patch_value) in patch_map {
                    if patch_value.is_null() {
                        base_map.remove(key);
                    } else if patch_value.is_object() {
                        let entry = base_map
                            .entry(key.clone())
                            .or_insert(JsonValue::Object(Map::new()));
                        apply_merge_patch(entry, patch_value);
                    } else {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        other => {
            *base = other.clone();
        }
    }
}

/// True when a computed patch carries no changes
pub fn is_empty_patch(patch: &JsonValue) -> bool {
    matches!(patch, JsonValue::Object(map) if map.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_documents_yield_empty_patch() {
        let doc = json!({"spec": {"replicas": 2, "paused": false}});
        let patch = merge_patch(&doc, &doc);
        assert!(is_empty_patch(&patch));
    }

    #[test]
    fn test_changed_scalar() {
        let patch = merge_patch(
            &json!({"spec": {"replicas": 2}}),
            &json!({"spec": {"replicas": 3}}),
        );
        assert_eq!(patch, json!({"spec": {"replicas": 3}}));
    }

    #[test]
    fn test_removed_key_becomes_null() {
        let patch = merge_patch(
            &json!({"metadata": {"labels": {"a": "1", "b": "2"}}}),
            &json!({"metadata": {"labels": {"a": "1"}}}),
        );
        assert_eq!(patch, json!({"metadata": {"labels": {"b": null}}}));
    }

    #[test]
    fn test_arrays_replace_wholesale() {
        let patch = merge_patch(
            &json!({"spec": {"args": ["a", "b"]}}),
            &json!({"spec": {"args": ["a"]}}),
        );
        assert_eq!(patch, json!({"spec": {"args": ["a"]}}));
    }

    #[test]
    fn test_apply_round_trip() {
        let original = json!({
            "spec": {"replicas": 2, "selector": {"app": "web"}},
            "metadata": {"labels": {"old": "yes"}}
        });
        let target = json!({
            "spec": {"replicas": 5, "selector": {"app": "web"}},
            "metadata": {"labels": {"new": "yes"}}
        });

        let patch = merge_patch(&original, &target);
        let mut patched = original.clone();
        apply_merge_patch(&mut patched, &patch);
        assert_eq!(patched, target);
    }

    #[test]
    fn test_apply_null_removes() {
        let mut base = json!({"a": 1, "b": 2});
        apply_merge_patch(&mut base, &json!({"b": null}));
        assert_eq!(base, json!({"a": 1}));
    }
}
