//! Manifest encoding: the delimiter-joined resource set format
//!
//! A persisted manifest is an ordered list of resource documents joined with
//! a fixed delimiter. Splitting uses the same delimiter and tolerates empty
//! and comment-only segments, so a round trip through storage is lossless for
//! every real document.

use crate::error::Result;
use crate::resource::ResourceDoc;

/// The literal delimiter between documents in a persisted manifest
pub const MANIFEST_DELIMITER: &str = "\n---\n";

/// Join rendered documents into a manifest string
pub fn join_manifest(docs: &[ResourceDoc]) -> String {
    docs.iter()
        .map(|d| d.yaml.trim_end().to_string())
        .collect::<Vec<_>>()
        .join(MANIFEST_DELIMITER)
}

/// Split a manifest string back into resource documents
///
/// Empty segments and segments containing only comments are skipped.
pub fn split_manifest(manifest: &str) -> Result<Vec<ResourceDoc>> {
    let mut docs = Vec::new();

    for segment in manifest.split(MANIFEST_DELIMITER) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if segment
            .lines()
            .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        {
            continue;
        }

        docs.push(ResourceDoc::from_yaml(segment)?);
    }

    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> ResourceDoc {
        ResourceDoc::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_join_then_split_round_trip() {
        let docs = vec![
            doc("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: ns1"),
            doc("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg1"),
        ];

        let manifest = join_manifest(&docs);
        assert!(manifest.contains("\n---\n"));

        let parsed = split_manifest(&manifest).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].kind, "Namespace");
        assert_eq!(parsed[1].kind, "ConfigMap");
    }

    #[test]
    fn test_split_tolerates_empty_segments() {
        let manifest = "\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n---\n\n---\n";
        let parsed = split_manifest(manifest).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "cfg");
    }

    #[test]
    fn test_split_skips_comment_only_segments() {
        let manifest =
            "# generated\n---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\n";
        let parsed = split_manifest(manifest).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind, "Secret");
    }

    #[test]
    fn test_split_empty_manifest() {
        assert!(split_manifest("").unwrap().is_empty());
    }

    #[test]
    fn test_join_preserves_order() {
        let docs = vec![
            doc("apiVersion: v1\nkind: Service\nmetadata:\n  name: svc"),
            doc("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app"),
        ];
        let manifest = join_manifest(&docs);
        let svc_at = manifest.find("kind: Service").unwrap();
        let dep_at = manifest.find("kind: Deployment").unwrap();
        assert!(svc_at < dep_at);
    }
}
