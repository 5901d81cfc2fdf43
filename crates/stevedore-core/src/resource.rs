//! Rendered resource documents and their identity keys

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};

/// Identity of a resource document within one namespace
///
/// This is the key the reconciliation diff is computed over. The namespace is
/// call-scoped and not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// API group ("" for the core group)
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Resource kind
    pub kind: String,
    /// Resource name
    pub name: String,
}

impl ResourceKey {
    /// The apiVersion string this key was parsed from
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.api_version(), self.kind, self.name)
    }
}

/// One rendered resource document
///
/// Holds the raw YAML alongside the parsed value and the identity fields the
/// engine needs. The parsed value is JSON-shaped so patch computation can
/// work on it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDoc {
    /// The full YAML content
    pub yaml: String,
    /// Parsed document value
    pub value: JsonValue,
    /// apiVersion field
    pub api_version: String,
    /// Resource kind
    pub kind: String,
    /// Resource name
    pub name: String,
    /// Resource namespace (if specified)
    pub namespace: Option<String>,
    /// Metadata annotations
    pub annotations: BTreeMap<String, String>,
}

impl ResourceDoc {
    /// Parse a resource document from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;

        let api_version = value
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::MissingField {
                field: "apiVersion".to_string(),
            })?
            .to_string();

        let kind = value
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::MissingField {
                field: "kind".to_string(),
            })?
            .to_string();

        let metadata = value.get("metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .ok_or_else(|| CoreError::MissingField {
                field: "metadata.name".to_string(),
            })?
            .to_string();

        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(|n| n.as_str())
            .map(String::from);

        let annotations: BTreeMap<String, String> = metadata
            .and_then(|m| m.get("annotations"))
            .and_then(|a| serde_json::from_value(a.clone()).ok())
            .unwrap_or_default();

        Ok(Self {
            yaml: yaml.to_string(),
            value,
            api_version,
            kind,
            name,
            namespace,
            annotations,
        })
    }

    /// Get the diff key for this document
    pub fn key(&self) -> ResourceKey {
        let (group, version) = split_api_version(&self.api_version);
        ResourceKey {
            group,
            version,
            kind: self.kind.clone(),
            name: self.name.clone(),
        }
    }

    /// Get an annotation value
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Display name for logging
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.kind, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// Split an apiVersion string into group and version
///
/// - "apps/v1" -> ("apps", "v1")
/// - "v1" -> ("", "v1") (core API)
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENT: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: demo
  annotations:
    stevedore.io/path: app/web
spec:
  replicas: 2
";

    #[test]
    fn test_parse_document() {
        let doc = ResourceDoc::from_yaml(DEPLOYMENT).unwrap();
        assert_eq!(doc.api_version, "apps/v1");
        assert_eq!(doc.kind, "Deployment");
        assert_eq!(doc.name, "web");
        assert_eq!(doc.namespace.as_deref(), Some("demo"));
        assert_eq!(doc.annotation("stevedore.io/path"), Some("app/web"));
    }

    #[test]
    fn test_key_splits_api_version() {
        let doc = ResourceDoc::from_yaml(DEPLOYMENT).unwrap();
        let key = doc.key();
        assert_eq!(key.group, "apps");
        assert_eq!(key.version, "v1");
        assert_eq!(key.kind, "Deployment");
        assert_eq!(key.name, "web");
        assert_eq!(key.api_version(), "apps/v1");
    }

    #[test]
    fn test_core_group_key() {
        let doc =
            ResourceDoc::from_yaml("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n")
                .unwrap();
        let key = doc.key();
        assert_eq!(key.group, "");
        assert_eq!(key.version, "v1");
        assert_eq!(key.api_version(), "v1");
        assert_eq!(key.to_string(), "v1/ConfigMap/cfg");
    }

    #[test]
    fn test_missing_name_is_error() {
        let err = ResourceDoc::from_yaml("apiVersion: v1\nkind: ConfigMap\n").unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn test_split_api_version_variants() {
        assert_eq!(
            split_api_version("networking.k8s.io/v1"),
            ("networking.k8s.io".to_string(), "v1".to_string())
        );
        assert_eq!(split_api_version("v1"), (String::new(), "v1".to_string()));
    }

    #[test]
    fn test_display_name() {
        let doc = ResourceDoc::from_yaml(DEPLOYMENT).unwrap();
        assert_eq!(doc.display_name(), "demo/Deployment/web");
    }
}
