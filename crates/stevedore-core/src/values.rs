//! Values handling with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

/// Values container with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Parse values from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Ok(Self(value))
    }

    /// Parse values from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Get a value by dotted path (e.g., "image.tag")
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let mut current = &self.0;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

/// Recursively merge overlay into base
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_scalars_replace() {
        let mut base = Values(json!({"replicas": 1, "tag": "v1"}));
        let overlay = Values(json!({"replicas": 3}));
        base.merge(&overlay);

        assert_eq!(base.get("replicas"), Some(&json!(3)));
        assert_eq!(base.get("tag"), Some(&json!("v1")));
    }

    #[test]
    fn test_merge_objects_recurse() {
        let mut base = Values(json!({"image": {"repository": "nginx", "tag": "1.25"}}));
        let overlay = Values(json!({"image": {"tag": "1.27"}}));
        base.merge(&overlay);

        assert_eq!(base.get("image.repository"), Some(&json!("nginx")));
        assert_eq!(base.get("image.tag"), Some(&json!("1.27")));
    }

    #[test]
    fn test_merge_arrays_replace() {
        let mut base = Values(json!({"args": ["a", "b"]}));
        let overlay = Values(json!({"args": ["c"]}));
        base.merge(&overlay);

        assert_eq!(base.get("args"), Some(&json!(["c"])));
    }

    #[test]
    fn test_from_yaml() {
        let values = Values::from_yaml("replicas: 2\nimage:\n  tag: stable\n").unwrap();
        assert_eq!(values.get("image.tag"), Some(&json!("stable")));
    }

    #[test]
    fn test_is_empty() {
        assert!(Values::new().is_empty());
        assert!(!Values(json!({"a": 1})).is_empty());
    }

    #[test]
    fn test_equality_is_structural() {
        let a = Values::from_json(r#"{"a": 1, "b": 2}"#).unwrap();
        let b = Values::from_json(r#"{"b": 2, "a": 1}"#).unwrap();
        assert_eq!(a, b);
    }
}
