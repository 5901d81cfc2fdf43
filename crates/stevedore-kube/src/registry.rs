//! Per-kind apply-time touch-ups
//!
//! Some kinds need small adjustments at apply time (cluster-assigned
//! immutable fields, defaulted lists). The registry maps a resource kind to a
//! touch-up capability consulted before create and patch requests. It is an
//! explicit object constructed during startup and passed by reference; a kind
//! without an entry is a no-op, not an error.

use std::collections::HashMap;
use std::sync::Arc;

use kube::api::DynamicObject;
use serde_json::Value as JsonValue;

/// Apply-time adjustment for one resource kind
pub trait TouchUp: Send + Sync {
    /// Adjust an object about to be created
    fn before_create(&self, _obj: &mut DynamicObject) {}

    /// Adjust a computed merge patch before it is applied to the live object
    fn before_patch(&self, _live: &DynamicObject, _patch: &mut JsonValue) {}
}

/// Registry of kind-specific touch-ups
#[derive(Clone, Default)]
pub struct TouchUpRegistry {
    entries: HashMap<String, Arc<dyn TouchUp>>,
}

impl TouchUpRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in touch-ups registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("Service", Arc::new(ServiceClusterIpTouchUp));
        registry
    }

    /// Register a touch-up for a kind, replacing any previous entry
    pub fn register(&mut self, kind: &str, touch_up: Arc<dyn TouchUp>) {
        self.entries.insert(kind.to_string(), touch_up);
    }

    /// Run the kind's create touch-up, if registered
    pub fn before_create(&self, kind: &str, obj: &mut DynamicObject) {
        if let Some(touch_up) = self.entries.get(kind) {
            touch_up.before_create(obj);
        }
    }

    /// Run the kind's patch touch-up, if registered
    pub fn before_patch(&self, kind: &str, live: &DynamicObject, patch: &mut JsonValue) {
        if let Some(touch_up) = self.entries.get(kind) {
            touch_up.before_patch(live, patch);
        }
    }
}

/// Preserves the live-assigned `spec.clusterIP` of a Service across patches
///
/// Rendered service documents rarely pin a cluster IP, so a naive
/// original→target patch would null out the field the API server assigned at
/// creation, which the server rejects as an immutable-field change.
pub struct ServiceClusterIpTouchUp;

impl TouchUp for ServiceClusterIpTouchUp {
    fn before_patch(&self, _live: &DynamicObject, patch: &mut JsonValue) {
        if let Some(spec) = patch.get_mut("spec").and_then(|s| s.as_object_mut()) {
            if spec.get("clusterIP").is_some_and(|ip| ip.is_null()) {
                spec.remove("clusterIP");
            }
        }
    }
}
