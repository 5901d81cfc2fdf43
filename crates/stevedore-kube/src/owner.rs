//! Ownership guard: the single gate in front of every mutating operation
//!
//! Resources created by the engine carry owner references pointing at their
//! release. Before a patch or delete is issued, the live object's references
//! are checked against the caller's required owner list; anything that is not
//! owned is left untouched. Multi-owner and zero-owner resources are
//! conservatively never deleted.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use stevedore_core::OwnerIdentity;

/// Check whether a live object is owned by every required identity
///
/// An empty `required` list means the operation is unrestricted and always
/// passes. Otherwise each required identity must appear in the candidate's
/// owner-reference list with an exact match on apiVersion, kind, name, and
/// uid.
pub fn owns(required: &[OwnerIdentity], candidate: &DynamicObject) -> bool {
    if required.is_empty() {
        return true;
    }

    let refs = match candidate.metadata.owner_references.as_deref() {
        Some(refs) => refs,
        None => return false,
    };

    required.iter().all(|owner| {
        refs.iter().any(|r| {
            r.api_version == owner.api_version
                && r.kind == owner.kind
                && r.name == owner.name
                && r.uid == owner.uid
        })
    })
}

/// Check whether an object is owned by `required` and by nobody else
///
/// Garbage-collection style deletion of resources that are absent from the
/// current manifest uses this stricter check: a resource with zero or
/// multiple owner references is never a deletion candidate, even when the
/// required identity is among its owners.
pub fn solely_owned(required: &OwnerIdentity, candidate: &DynamicObject) -> bool {
    match candidate.metadata.owner_references.as_deref() {
        Some([only]) => {
            only.api_version == required.api_version
                && only.kind == required.kind
                && only.name == required.name
                && only.uid == required.uid
        }
        _ => false,
    }
}

/// Stamp owner references onto an object about to be created
///
/// Identities already present are not duplicated.
pub fn stamp_owners(obj: &mut DynamicObject, owners: &[OwnerIdentity]) {
    let refs = obj.metadata.owner_references.get_or_insert_with(Vec::new);

    for owner in owners {
        let present = refs.iter().any(|r| {
            r.api_version == owner.api_version
                && r.kind == owner.kind
                && r.name == owner.name
                && r.uid == owner.uid
        });
        if !present {
            refs.push(owner_reference(owner));
        }
    }
}

/// Convert an owner identity into a wire owner reference
pub fn owner_reference(owner: &OwnerIdentity) -> OwnerReference {
    OwnerReference {
        api_version: owner.api_version.clone(),
        kind: owner.kind.clone(),
        name: owner.name.clone(),
        uid: owner.uid.clone(),
        controller: Some(true),
        block_owner_deletion: None,
    }
}
