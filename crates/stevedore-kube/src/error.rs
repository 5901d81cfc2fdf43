//! Error types for stevedore-kube

use thiserror::Error;

/// Result type for stevedore-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during reconciliation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Release not found
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Mutation attempted against a resource owned by someone else
    #[error("not authorized to modify '{resource}': not owned by this release")]
    Unauthorized { resource: String },

    /// Creation collided with an existing, unowned resource
    #[error("resource conflict on '{resource}': {message}")]
    ResourceConflict { resource: String, message: String },

    /// Live object missing where one was required
    #[error("object '{resource}' not found")]
    ObjectNotFound { resource: String },

    /// Rollback not possible
    #[error("cannot rollback release '{name}': {reason}")]
    RollbackNotPossible { name: String, reason: String },

    /// Template rendering error
    #[error("render error: {0}")]
    Render(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Invalid resource hierarchy
    #[error("invalid resource hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Collected failures from concurrent sibling execution
    #[error("{count} subtree error(s): {message}")]
    Aggregate { count: usize, message: String },

    /// Enqueue attempted after the release worker was stopped
    #[error("handler for release '{name}' in namespace '{namespace}' is closed")]
    HandlerClosed { name: String, namespace: String },

    /// Internal coordination invariant violated
    #[error("coordination error: {0}")]
    Coordination(String),

    /// Operation observed cancellation
    #[error("operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<stevedore_core::CoreError> for KubeError {
    fn from(e: stevedore_core::CoreError) -> Self {
        KubeError::InvalidManifest(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409 or a create collision)
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            KubeError::ResourceConflict { .. } => true,
            _ => false,
        }
    }

    /// Aggregate a non-empty list of errors into one
    pub fn aggregate(errors: Vec<KubeError>) -> Self {
        let count = errors.len();
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        KubeError::Aggregate { count, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_joins_messages() {
        let err = KubeError::aggregate(vec![
            KubeError::Render("bad template".to_string()),
            KubeError::Storage("lost".to_string()),
        ]);

        match err {
            KubeError::Aggregate { count, message } => {
                assert_eq!(count, 2);
                assert!(message.contains("bad template"));
                assert!(message.contains("lost"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conflict_classification() {
        let err = KubeError::ResourceConflict {
            resource: "v1/ConfigMap/cfg".to_string(),
            message: "already exists".to_string(),
        };
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }
}
