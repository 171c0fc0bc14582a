use crate::router::SubmissionRouter;
use async_trait::async_trait;
use ctf_storage::{
    AggregateStore, AppendDecision, ScoredAppend, ScoringStorage, StorageResult, SubmissionLedger,
};
use ctf_types::{
    ChallengeId, EventScope, ScopeKey, Submission, SubmissionAppend, SubmissionId, UserAggregate,
    UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Ledger wrapper that routes every durable append.
///
/// Routing happens only after the inner backend returned success, so
/// subscribers never observe a submission that was rolled back.
pub struct LiveLedger {
    inner: Arc<dyn ScoringStorage>,
    router: Arc<SubmissionRouter>,
}

impl LiveLedger {
    pub fn new(inner: Arc<dyn ScoringStorage>, router: Arc<SubmissionRouter>) -> Self {
        Self { inner, router }
    }

    pub fn router(&self) -> &Arc<SubmissionRouter> {
        &self.router
    }

    pub fn inner(&self) -> &Arc<dyn ScoringStorage> {
        &self.inner
    }

    async fn publish(&self, submission: &Submission) {
        let delivered = self.router.route(submission).await;
        debug!(submission = %submission.id, delivered, "submission routed");
    }
}

#[async_trait]
impl SubmissionLedger for LiveLedger {
    async fn append(&self, record: SubmissionAppend) -> StorageResult<Submission> {
        let submission = self.inner.append(record).await?;
        self.publish(&submission).await;
        Ok(submission)
    }

    async fn append_scored(
        &self,
        scope: &ScopeKey,
        decide: AppendDecision<'_>,
    ) -> StorageResult<ScoredAppend> {
        let scored = self.inner.append_scored(scope, decide).await?;
        self.publish(&scored.submission).await;
        Ok(scored)
    }

    async fn query(&self, scope: &ScopeKey) -> StorageResult<Vec<Submission>> {
        self.inner.query(scope).await
    }

    async fn query_event(
        &self,
        challenge_id: &ChallengeId,
        event: &EventScope,
    ) -> StorageResult<Vec<Submission>> {
        self.inner.query_event(challenge_id, event).await
    }

    async fn get(&self, id: &SubmissionId) -> StorageResult<Option<Submission>> {
        self.inner.get(id).await
    }
}

#[async_trait]
impl AggregateStore for LiveLedger {
    async fn user_aggregate(&self, user_id: &UserId) -> StorageResult<UserAggregate> {
        self.inner.user_aggregate(user_id).await
    }
}
