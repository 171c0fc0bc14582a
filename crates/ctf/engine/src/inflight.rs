//! Server-side duplicate suppression for concurrent submissions.

use ctf_types::ScopeKey;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// (scope, resolved target question). `None` targets unmatched submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InFlightKey {
    pub scope: ScopeKey,
    pub target: Option<usize>,
}

impl InFlightKey {
    pub fn new(scope: ScopeKey, target: Option<usize>) -> Self {
        Self { scope, target }
    }
}

/// Set of submissions currently between validation and commit.
#[derive(Debug, Default)]
pub struct InFlightSet {
    entries: Mutex<HashSet<InFlightKey>>,
}

impl InFlightSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `key`, or `None` when another submission already holds it.
    pub fn try_acquire(self: &Arc<Self>, key: InFlightKey) -> Option<InFlightGuard> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(self),
            key,
        })
    }

    pub fn contains(&self, key: &InFlightKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its key on drop, on success and failure paths alike.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<InFlightSet>,
    key: InFlightKey,
}

impl InFlightGuard {
    pub fn key(&self) -> &InFlightKey {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
