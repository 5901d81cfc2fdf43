//! Installation-order ranking for resource kinds
//!
//! Batch creates run in ascending rank so that, e.g., a namespace or secret
//! exists before a workload that references it; batch deletes run in the
//! mirrored order so workloads go before the namespace containing them. The
//! ranking is a best-effort convenience over kinds, not a dependency graph:
//! it never inspects references between resources.

use std::cmp::Reverse;

use stevedore_core::ResourceDoc;

/// Kinds in installation order; uninstallation is the mirror image.
const INSTALL_ORDER: &[&str] = &[
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "Role",
    "RoleBinding",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "StatefulSet",
    "Job",
    "CronJob",
    "Ingress",
    "APIService",
];

/// Installation rank of a kind; unknown kinds sort last
pub fn install_rank(kind: &str) -> usize {
    INSTALL_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(INSTALL_ORDER.len())
}

/// Sort documents for batch creation (ascending rank, stable)
pub fn sort_for_install(docs: &mut [ResourceDoc]) {
    docs.sort_by_key(|d| install_rank(&d.kind));
}

/// Sort documents for batch deletion (descending rank, stable)
pub fn sort_for_uninstall(docs: &mut [ResourceDoc]) {
    docs.sort_by_key(|d| Reverse(install_rank(&d.kind)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(kind: &str, name: &str) -> ResourceDoc {
        let api_version = match kind {
            "Deployment" => "apps/v1",
            _ => "v1",
        };
        ResourceDoc::from_yaml(&format!(
            "apiVersion: {}\nkind: {}\nmetadata:\n  name: {}\n",
            api_version, kind, name
        ))
        .unwrap()
    }

    fn kinds(docs: &[ResourceDoc]) -> Vec<&str> {
        docs.iter().map(|d| d.kind.as_str()).collect()
    }

    #[test]
    fn test_install_order() {
        let mut docs = vec![
            doc("Service", "svc"),
            doc("Deployment", "app"),
            doc("Namespace", "ns"),
        ];
        sort_for_install(&mut docs);
        assert_eq!(kinds(&docs), ["Namespace", "Service", "Deployment"]);
    }

    #[test]
    fn test_uninstall_order_is_mirror() {
        let mut docs = vec![
            doc("Namespace", "ns"),
            doc("Service", "svc"),
            doc("Deployment", "app"),
        ];
        sort_for_uninstall(&mut docs);
        assert_eq!(kinds(&docs), ["Deployment", "Service", "Namespace"]);
    }

    #[test]
    fn test_unknown_kinds_sort_last() {
        let mut docs = vec![doc("FluxCapacitor", "x"), doc("Namespace", "ns")];
        sort_for_install(&mut docs);
        assert_eq!(kinds(&docs), ["Namespace", "FluxCapacitor"]);

        let mut docs = vec![doc("Namespace", "ns"), doc("FluxCapacitor", "x")];
        sort_for_uninstall(&mut docs);
        assert_eq!(kinds(&docs), ["FluxCapacitor", "Namespace"]);
    }

    #[test]
    fn test_sort_is_stable_within_rank() {
        let mut docs = vec![
            doc("ConfigMap", "a"),
            doc("ConfigMap", "b"),
            doc("Namespace", "ns"),
            doc("ConfigMap", "c"),
        ];
        sort_for_install(&mut docs);
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["ns", "a", "b", "c"]);
    }
}
