use crate::model::{AppendDecision, ScoredAppend};
use crate::StorageResult;
use async_trait::async_trait;
use ctf_types::{
    ChallengeId, EventScope, ScopeKey, Submission, SubmissionAppend, SubmissionId, UserAggregate,
    UserId,
};

/// Append-only storage interface for submissions.
#[async_trait]
pub trait SubmissionLedger: Send + Sync {
    /// Persist an immutable submission and return it with its assigned identity.
    ///
    /// Awarding records are folded into the user's aggregate, but no award
    /// uniqueness is enforced here; use [`SubmissionLedger::append_scored`].
    async fn append(&self, record: SubmissionAppend) -> StorageResult<Submission>;

    /// Atomic conditional append.
    ///
    /// Reads the history for `scope`, hands it to `decide`, inserts the
    /// returned record and applies its award to the user aggregate, all
    /// without any other write to `scope` interleaving.
    async fn append_scored(
        &self,
        scope: &ScopeKey,
        decide: AppendDecision<'_>,
    ) -> StorageResult<ScoredAppend>;

    /// All submissions for one (challenge, user, event). Order is unspecified.
    async fn query(&self, scope: &ScopeKey) -> StorageResult<Vec<Submission>>;

    /// All submissions for a challenge within one event, across users.
    async fn query_event(
        &self,
        challenge_id: &ChallengeId,
        event: &EventScope,
    ) -> StorageResult<Vec<Submission>>;

    /// Get one submission by id.
    async fn get(&self, id: &SubmissionId) -> StorageResult<Option<Submission>>;
}

/// Storage interface for per-user running totals.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Current aggregate; an empty aggregate for users with no awards.
    async fn user_aggregate(&self, user_id: &UserId) -> StorageResult<UserAggregate>;
}

/// Unified storage bundle used by the scoring engine.
pub trait ScoringStorage: SubmissionLedger + AggregateStore + Send + Sync {}

impl<T> ScoringStorage for T where T: SubmissionLedger + AggregateStore + Send + Sync {}

pub(crate) fn ensure_in_scope(scope: &ScopeKey, record: &SubmissionAppend) -> StorageResult<()> {
    if record.challenge_id != scope.challenge_id
        || record.user_id != scope.user_id
        || record.event != scope.event
    {
        return Err(crate::StorageError::InvariantViolation(format!(
            "record for {} decided under scope {}",
            record.scope(),
            scope
        )));
    }
    Ok(())
}

/// Field-level invariants every stored record satisfies.
pub(crate) fn validate_record(record: &SubmissionAppend) -> StorageResult<()> {
    if record.points_awarded > 0 && !record.is_correct {
        return Err(crate::StorageError::InvalidInput(
            "incorrect submission cannot award points".to_string(),
        ));
    }
    if record.points_awarded > 0 && record.points_awarded != record.question_points {
        return Err(crate::StorageError::InvalidInput(format!(
            "points awarded ({}) must be 0 or the question's points ({})",
            record.points_awarded, record.question_points
        )));
    }
    Ok(())
}
