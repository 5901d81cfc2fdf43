//! Stevedore Kube - the release reconciliation engine
//!
//! This crate provides:
//! - **Reconciliation Client**: Diff-based create/patch/delete plan execution
//!   with strict ownership rules and installation ordering
//! - **Resource Tree (Carrier)**: Hierarchical grouping of a rendered
//!   resource set with ordered, sibling-parallel traversal
//! - **Release Judgement**: Pure classification of a release transition into
//!   no-op / create / rollback / update
//! - **Dispatch**: One worker actor per release key with trigger coalescing
//!   and bounded retry
//! - **Capabilities**: Renderer, release storage, and cluster access consumed
//!   as traits, with in-memory mocks for testing without a cluster

pub mod client;
pub mod cluster;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod judge;
pub mod order;
pub mod owner;
pub mod patch;
pub mod reconciler;
pub mod registry;
pub mod render;
pub mod storage;
pub mod tree;

pub use client::{CreateOptions, DeleteOptions, GetOptions, ReconcileClient, UpdateOptions};
pub use cluster::{ClusterAccess, ClusterOp, DynamicCluster, MockCluster, Verb};
pub use context::{CancelSource, ExecContext};
pub use dispatch::{Applier, DispatcherConfig, DispatcherManager, ReleaseKey, ReleaseWorker};
pub use error::{KubeError, Result};
pub use judge::{HistoryLookup, ReleaseAction, classify, is_create, is_noop, is_rollback, is_update};
pub use order::{install_rank, sort_for_install, sort_for_uninstall};
pub use owner::{owner_reference, owns, solely_owned, stamp_owners};
pub use patch::{apply_merge_patch, is_empty_patch, merge_patch};
pub use reconciler::ReleaseReconciler;
pub use registry::{ServiceClusterIpTouchUp, TouchUp, TouchUpRegistry};
pub use render::Renderer;
pub use storage::{MockReleaseStorage, ReleaseStorage, StatusPatch, StorageCounts};
pub use tree::{NodeHandler, PATH_ANNOTATION, ResourceTree, TraversalOrder};
