//! Release and release history types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::values::Values;

/// apiVersion of the Release resource
pub const RELEASE_API_VERSION: &str = "stevedore.io/v1alpha1";

/// Kind of the Release resource
pub const RELEASE_KIND: &str = "Release";

/// Maximum number of condition entries kept on a release
pub const MAX_CONDITIONS: usize = 5;

/// The declarative unit of reconciliation
///
/// A release pairs template bytes with configuration values; its status
/// records the last applied version and manifest. The manifest is the source
/// of truth for what currently exists in the cluster and is diffed against on
/// every subsequent reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name
    pub name: String,

    /// Namespace the release reconciles into
    pub namespace: String,

    /// Cluster-assigned unique identifier, used as the owner token
    pub uid: String,

    /// Desired state
    #[serde(default)]
    pub spec: ReleaseSpec,

    /// Observed state
    #[serde(default)]
    pub status: ReleaseStatus,
}

impl Release {
    /// The release's identity as an owner of cluster resources
    pub fn owner_identity(&self) -> OwnerIdentity {
        OwnerIdentity {
            api_version: RELEASE_API_VERSION.to_string(),
            kind: RELEASE_KIND.to_string(),
            name: self.name.clone(),
            uid: self.uid.clone(),
        }
    }

    /// Append a condition, trimming the log to the last `MAX_CONDITIONS`
    pub fn push_condition(&mut self, condition: ReleaseCondition) {
        self.status.conditions.push(condition);
        if self.status.conditions.len() > MAX_CONDITIONS {
            let excess = self.status.conditions.len() - MAX_CONDITIONS;
            self.status.conditions.drain(..excess);
        }
    }

    /// The most recently recorded condition
    pub fn latest_condition(&self) -> Option<&ReleaseCondition> {
        self.status.conditions.last()
    }
}

/// Desired state of a release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSpec {
    /// Template bytes (rendered by an external engine)
    #[serde(default, with = "template_serde")]
    pub template: Vec<u8>,

    /// Configuration values fed to the renderer
    #[serde(default)]
    pub config: Values,

    /// Requested rollback target, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_to: Option<RollbackTarget>,

    /// Suspended releases are not reconciled
    #[serde(default)]
    pub suspend: bool,
}

/// Rollback request embedded in a release spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackTarget {
    /// History version to restore
    pub version: u32,
}

/// Observed state of a release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStatus {
    /// Last applied version (0 = never applied; first applied version is 1)
    #[serde(default)]
    pub version: u32,

    /// Last applied rendered resource set, delimiter-joined
    #[serde(default)]
    pub manifest: String,

    /// Recent status transitions, bounded to the last `MAX_CONDITIONS`
    #[serde(default)]
    pub conditions: Vec<ReleaseCondition>,

    /// Free-form per-kind details, written by an external status aggregator
    #[serde(default)]
    pub details: HashMap<String, JsonValue>,
}

/// One status transition entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseCondition {
    /// Condition classification
    pub kind: ConditionKind,

    /// Machine-readable reason
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// When the transition was recorded
    pub last_transition: DateTime<Utc>,
}

impl ReleaseCondition {
    /// Condition for a successfully applied version
    pub fn available(reason: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Available,
            reason: reason.to_string(),
            message: message.into(),
            last_transition: Utc::now(),
        }
    }

    /// Condition for an in-flight transition
    pub fn progressing(reason: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Progressing,
            reason: reason.to_string(),
            message: message.into(),
            last_transition: Utc::now(),
        }
    }

    /// Condition for a failed reconciliation attempt
    pub fn failure(reason: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Failure,
            reason: reason.to_string(),
            message: message.into(),
            last_transition: Utc::now(),
        }
    }
}

/// Classification of a condition entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionKind {
    /// The recorded version is live in the cluster
    Available,
    /// A transition is in flight
    Progressing,
    /// The latest attempt failed
    Failure,
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConditionKind::Available => "available",
            ConditionKind::Progressing => "progressing",
            ConditionKind::Failure => "failure",
        };
        write!(f, "{}", s)
    }
}

/// An immutable snapshot of one applied release version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseHistory {
    /// Derived name: `"<release>-v<version>"`
    pub name: String,

    /// Version this snapshot records
    pub version: u32,

    /// Free-form description of the transition
    pub description: String,

    /// Template bytes rendered for this version
    #[serde(default, with = "template_serde")]
    pub template: Vec<u8>,

    /// Config used for this version
    #[serde(default)]
    pub config: Values,

    /// Resource set rendered for this version
    pub manifest: String,
}

impl ReleaseHistory {
    /// Derived name of the history entry for a release version
    pub fn history_name(release: &str, version: u32) -> String {
        format!("{}-v{}", release, version)
    }

    /// Snapshot the given release at its current version
    pub fn for_release(release: &Release, description: impl Into<String>) -> Self {
        Self {
            name: Self::history_name(&release.name, release.status.version),
            version: release.status.version,
            description: description.into(),
            template: release.spec.template.clone(),
            config: release.spec.config.clone(),
            manifest: release.status.manifest.clone(),
        }
    }
}

/// Identity entry in an owner-reference list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerIdentity {
    /// Owner apiVersion
    pub api_version: String,
    /// Owner kind
    pub kind: String,
    /// Owner name
    pub name: String,
    /// Owner unique identifier
    pub uid: String,
}

/// Serialization helper: template bytes as base64
mod template_serde {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
