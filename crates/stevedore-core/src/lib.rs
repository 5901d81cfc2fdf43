//! Stevedore Core - Core types for the release reconciliation engine
//!
//! This crate provides the foundational types used throughout Stevedore:
//! - `Release`: The declarative unit of reconciliation (template + config)
//! - `ReleaseHistory`: An immutable snapshot of one applied version
//! - `ResourceDoc`: One rendered cluster resource document
//! - `Values`: Configuration values with deep merge support
//! - Manifest encoding: the delimiter-joined resource set format

pub mod error;
pub mod manifest;
pub mod release;
pub mod resource;
pub mod values;

pub use error::{CoreError, Result};
pub use manifest::{MANIFEST_DELIMITER, join_manifest, split_manifest};
pub use release::{
    ConditionKind, MAX_CONDITIONS, OwnerIdentity, Release, ReleaseCondition, ReleaseHistory,
    ReleaseSpec, ReleaseStatus, RollbackTarget,
};
pub use resource::{ResourceDoc, ResourceKey};
pub use values::Values;
