//! In-memory reference implementation of the ledger traits.
//!
//! This adapter is deterministic and test-friendly. A single write lock spans
//! the whole read-decide-insert-increment sequence of `append_scored`, which
//! makes it serializable within one process. Multi-process deployments should
//! use the PostgreSQL backend.

use crate::model::{AppendDecision, ScoredAppend};
use crate::traits::{ensure_in_scope, validate_record, AggregateStore, SubmissionLedger};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use ctf_types::{
    ChallengeId, EventScope, ScopeKey, Submission, SubmissionAppend, SubmissionId, UserAggregate,
    UserId,
};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    submissions: Vec<Submission>,
    by_id: HashMap<SubmissionId, usize>,
    by_scope: HashMap<ScopeKey, Vec<usize>>,
    aggregates: HashMap<UserId, UserAggregate>,
}

impl LedgerState {
    fn scope_history(&self, scope: &ScopeKey) -> Vec<Submission> {
        self.by_scope
            .get(scope)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&pos| self.submissions[pos].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert(&mut self, record: SubmissionAppend) -> StorageResult<Submission> {
        validate_record(&record)?;

        let id = SubmissionId::generate();
        if self.by_id.contains_key(&id) {
            return Err(StorageError::Conflict(format!("submission {} already exists", id)));
        }

        let submission = record.into_submission(id);
        let position = self.submissions.len();
        self.by_id.insert(id, position);
        self.by_scope
            .entry(submission.scope())
            .or_default()
            .push(position);
        self.aggregates
            .entry(submission.user_id.clone())
            .or_insert_with(|| UserAggregate::empty(submission.user_id.clone()))
            .apply_award(&submission);
        self.submissions.push(submission.clone());
        Ok(submission)
    }

    fn aggregate(&self, user_id: &UserId) -> UserAggregate {
        self.aggregates
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserAggregate::empty(user_id.clone()))
    }
}

/// In-memory submission ledger.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored submissions.
    pub fn len(&self) -> StorageResult<usize> {
        let guard = self
            .state
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        Ok(guard.submissions.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl SubmissionLedger for InMemoryLedger {
    async fn append(&self, record: SubmissionAppend) -> StorageResult<Submission> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        guard.insert(record)
    }

    async fn append_scored(
        &self,
        scope: &ScopeKey,
        decide: AppendDecision<'_>,
    ) -> StorageResult<ScoredAppend> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;

        let history = guard.scope_history(scope);
        let record = decide(&history)?;
        ensure_in_scope(scope, &record)?;

        let submission = guard.insert(record)?;
        let aggregate = guard.aggregate(&submission.user_id);
        Ok(ScoredAppend {
            submission,
            aggregate,
        })
    }

    async fn query(&self, scope: &ScopeKey) -> StorageResult<Vec<Submission>> {
        let guard = self
            .state
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        Ok(guard.scope_history(scope))
    }

    async fn query_event(
        &self,
        challenge_id: &ChallengeId,
        event: &EventScope,
    ) -> StorageResult<Vec<Submission>> {
        let guard = self
            .state
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        Ok(guard
            .submissions
            .iter()
            .filter(|s| &s.challenge_id == challenge_id && &s.event == event)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &SubmissionId) -> StorageResult<Option<Submission>> {
        let guard = self
            .state
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        Ok(guard.by_id.get(id).map(|&pos| guard.submissions[pos].clone()))
    }
}

#[async_trait]
impl AggregateStore for InMemoryLedger {
    async fn user_aggregate(&self, user_id: &UserId) -> StorageResult<UserAggregate> {
        let guard = self
            .state
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        Ok(guard.aggregate(user_id))
    }
}
