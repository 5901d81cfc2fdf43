//! Release action classification
//!
//! Pure decision functions that classify a release transition by comparing
//! the desired spec against stored history and the previously observed
//! snapshot. Evaluated in fixed precedence (no-op, create, rollback, update)
//! so exactly one action is selected per reconciliation pass.

use stevedore_core::{Release, ReleaseHistory};

/// Read access to a release's stored history
pub trait HistoryLookup {
    /// The history entry recorded for a version, if any
    fn history_at(&self, version: u32) -> Option<&ReleaseHistory>;

    /// Whether no history entries exist yet
    fn is_empty(&self) -> bool;
}

impl HistoryLookup for [ReleaseHistory] {
    fn history_at(&self, version: u32) -> Option<&ReleaseHistory> {
        self.iter().find(|h| h.version == version)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryLookup for Vec<ReleaseHistory> {
    fn history_at(&self, version: u32) -> Option<&ReleaseHistory> {
        self.as_slice().history_at(version)
    }

    fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// The action selected for one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAction {
    /// Nothing to do
    None,
    /// First apply of a brand-new release
    Create,
    /// Restore a previous version
    Rollback,
    /// Apply a changed spec as a new version
    Update,
}

/// Whether the spec recorded in a history entry matches the release spec
fn spec_matches_history(release: &Release, history: &ReleaseHistory) -> bool {
    release.spec.template == history.template && release.spec.config == history.config
}

/// True when there is nothing to apply
///
/// Either the spec is structurally identical to the previous snapshot, or it
/// is unchanged against the history entry for the current recorded version
/// (a redundant re-trigger after an already-applied update). A pending
/// rollback request is never a no-op on the history leg.
pub fn is_noop(
    lookup: &dyn HistoryLookup,
    previous: Option<&Release>,
    current: &Release,
) -> bool {
    if previous.is_some_and(|p| p.spec == current.spec) {
        return true;
    }

    current.spec.rollback_to.is_none()
        && lookup
            .history_at(current.status.version)
            .is_some_and(|h| spec_matches_history(current, h))
}

/// True only for a release that has never been applied
pub fn is_create(lookup: &dyn HistoryLookup, current: &Release) -> bool {
    current.status.version == 0 && lookup.is_empty()
}

/// True when a rollback is newly requested or retargeted
pub fn is_rollback(previous: Option<&Release>, current: &Release) -> bool {
    let Some(target) = current.spec.rollback_to else {
        return false;
    };

    match previous.and_then(|p| p.spec.rollback_to) {
        None => true,
        Some(previous_target) => previous_target.version != target.version,
    }
}

/// True when the spec differs from the history entry at the current version
pub fn is_update(lookup: &dyn HistoryLookup, current: &Release) -> bool {
    current.status.version != 0
        && lookup
            .history_at(current.status.version)
            .is_none_or(|h| !spec_matches_history(current, h))
}

/// Classify the transition, applying the fixed precedence
pub fn classify(
    lookup: &dyn HistoryLookup,
    previous: Option<&Release>,
    current: &Release,
) -> ReleaseAction {
    if is_noop(lookup, previous, current) {
        ReleaseAction::None
    } else if is_create(lookup, current) {
        ReleaseAction::Create
    } else if is_rollback(previous, current) {
        ReleaseAction::Rollback
    } else if is_update(lookup, current) {
        ReleaseAction::Update
    } else {
        ReleaseAction::None
    }
}
