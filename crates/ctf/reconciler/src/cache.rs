//! Projection cache keyed by (user, challenge, event).

use crate::projection::ChallengeProgress;
use ctf_types::ScopeKey;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Last computed projection per scope.
///
/// An entry is only served while the scope's ledger size still equals the
/// size it was computed from; any new matching entry invalidates it.
#[derive(Default)]
pub struct ProjectionCache {
    entries: RwLock<HashMap<ScopeKey, ChallengeProgress>>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached projection for `scope` if it was built from `ledger_size` entries.
    pub fn get(&self, scope: &ScopeKey, ledger_size: usize) -> Option<ChallengeProgress> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let hit = entries
            .get(scope)
            .filter(|p| p.ledger_size == ledger_size)
            .cloned();
        trace!(scope = %scope, hit = hit.is_some(), "projection cache lookup");
        hit
    }

    pub fn put(&self, progress: ChallengeProgress) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(progress.scope(), progress);
    }

    pub fn invalidate(&self, scope: &ScopeKey) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(scope).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
