//! End-to-end scoring scenarios over the in-memory ledger.

use async_trait::async_trait;
use ctf_engine::{EngineConfig, InMemoryCatalog, ScoringEngine, SubmitError, SubmitRequest};
use ctf_reconciler::QuestionStatus;
use ctf_resolver::ResolutionOutcome;
use ctf_storage::memory::InMemoryLedger;
use ctf_storage::{
    AggregateStore, AppendDecision, ScoredAppend, StorageError, StorageResult, SubmissionLedger,
};
use ctf_types::{
    ChallengeId, EventScope, ScopeKey, Submission, SubmissionAppend, SubmissionId, UserAggregate,
    UserId,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

const CATALOG: &str = r#"[
    {
        "id": "two-part",
        "title": "Two part",
        "totalPoints": 30,
        "hasMultipleQuestions": true,
        "questions": [
            { "id": "q0", "flag": "flag{a}", "points": 10, "text": "first" },
            { "id": "q1", "flag": "flag{b}", "points": 20, "text": "second" }
        ]
    },
    {
        "id": "empty",
        "title": "Nothing to solve",
        "totalPoints": 0,
        "hasMultipleQuestions": true,
        "questions": []
    }
]"#;

fn catalog() -> Arc<InMemoryCatalog> {
    Arc::new(InMemoryCatalog::from_json_str(CATALOG).unwrap())
}

fn engine() -> Arc<ScoringEngine> {
    Arc::new(ScoringEngine::new(
        catalog(),
        Arc::new(InMemoryLedger::new()),
        EngineConfig::default(),
    ))
}

fn challenge() -> ChallengeId {
    ChallengeId::new("two-part")
}

fn alice() -> UserId {
    UserId::new("alice")
}

fn submit(flag: &str, event: EventScope) -> SubmitRequest {
    SubmitRequest::new(challenge(), alice(), event, flag)
}

#[tokio::test]
async fn scenario_first_correct_flag() {
    let engine = engine();
    let receipt = engine.submit(submit("flag{a}", EventScope::Practice)).await.unwrap();

    assert_eq!(receipt.outcome, ResolutionOutcome::Awarded);
    assert!(receipt.is_correct());
    assert_eq!(receipt.points_awarded(), 10);
    assert_eq!(receipt.submission.question_index, Some(0));

    let p = &receipt.progress;
    assert!(p.questions[0].is_solved);
    assert_eq!(p.questions[0].points_earned, 10);
    assert_eq!(p.total_points_earned, 10);
    assert_eq!((p.solved_count, p.total_question_count), (1, 2));
    assert_eq!(receipt.aggregate.total_points, 10);
}

#[tokio::test]
async fn scenario_resubmission_is_locked() {
    let engine = engine();
    engine.submit(submit("flag{a}", EventScope::Practice)).await.unwrap();

    let err = engine
        .submit(submit(" FLAG{A} ", EventScope::Practice))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::AlreadyLocked { question_index: 0, .. }));
    assert!(!err.is_retryable());

    let progress = engine
        .progress(&challenge(), &alice(), &EventScope::Practice)
        .await
        .unwrap();
    assert_eq!(progress.total_points_earned, 10);
    assert_eq!(progress.ledger_size, 1);
    assert_eq!(engine.user_aggregate(&alice()).await.unwrap().total_points, 10);
}

#[tokio::test]
async fn scenario_second_question_completes_challenge() {
    let engine = engine();
    engine.submit(submit("flag{a}", EventScope::Practice)).await.unwrap();
    let receipt = engine.submit(submit("FLAG{B}", EventScope::Practice)).await.unwrap();

    assert_eq!(receipt.points_awarded(), 20);
    let p = &receipt.progress;
    assert_eq!(p.questions[1].status, QuestionStatus::SolvedAwarded);
    assert_eq!(p.total_points_earned, 30);
    assert_eq!((p.solved_count, p.total_question_count), (2, 2));
    assert!(p.fully_solved);

    let aggregate = engine.user_aggregate(&alice()).await.unwrap();
    assert_eq!(aggregate.total_points, 30);
    assert!(aggregate.solved_challenge_ids.contains(&challenge()));
}

#[tokio::test]
async fn scenario_wrong_flag_is_recorded_without_effect() {
    let engine = engine();
    let before = engine
        .progress(&challenge(), &alice(), &EventScope::Practice)
        .await
        .unwrap();

    let receipt = engine.submit(submit("wrong", EventScope::Practice)).await.unwrap();
    assert_eq!(receipt.outcome, ResolutionOutcome::Unmatched);
    assert!(!receipt.is_correct());
    assert_eq!(receipt.points_awarded(), 0);
    assert_eq!(receipt.submission.question_index, None);
    assert_eq!(receipt.progress.questions, before.questions);

    let history = engine
        .history(&challenge(), &alice(), &EventScope::Practice)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].flag, "wrong");
}

#[tokio::test]
async fn scenario_events_are_independent() {
    let engine = engine();
    engine
        .submit(submit("flag{a}", EventScope::event("eventA")))
        .await
        .unwrap();

    let b = engine
        .progress(&challenge(), &alice(), &EventScope::event("eventB"))
        .await
        .unwrap();
    assert!(!b.questions[0].is_solved);

    // the same flag still awards inside another event
    let receipt = engine
        .submit(submit("flag{a}", EventScope::event("eventB")))
        .await
        .unwrap();
    assert_eq!(receipt.points_awarded(), 10);
}

#[tokio::test]
async fn zero_question_challenge() {
    let engine = engine();
    let p = engine
        .progress(&ChallengeId::new("empty"), &alice(), &EventScope::Practice)
        .await
        .unwrap();
    assert_eq!((p.solved_count, p.total_question_count), (0, 0));
    assert!(!p.fully_solved);

    let receipt = engine
        .submit(SubmitRequest::new(
            ChallengeId::new("empty"),
            alice(),
            EventScope::Practice,
            "flag{a}",
        ))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, ResolutionOutcome::Unmatched);
}

#[tokio::test]
async fn explicit_target_records_incorrect_attempt() {
    let engine = engine();
    let receipt = engine
        .submit(submit("nope", EventScope::Practice).with_question_index(1))
        .await
        .unwrap();

    assert_eq!(receipt.outcome, ResolutionOutcome::Incorrect);
    assert_eq!(receipt.submission.question_index, Some(1));
    assert_eq!(receipt.submission.question_points, 20);
    assert_eq!(receipt.progress.questions[1].submissions.len(), 1);
    assert!(!receipt.progress.questions[1].is_solved);
}

#[tokio::test]
async fn concurrent_correct_submissions_award_once() {
    let engine = engine();

    let attempts = (0..32).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit(submit("flag{a}", EventScope::event("finals"))).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let awarded = results
        .iter()
        .filter(|r| matches!(r, Ok(receipt) if receipt.points_awarded() > 0))
        .count();
    assert_eq!(awarded, 1);
    for result in &results {
        match result {
            Ok(receipt) => assert!(receipt.is_correct()),
            Err(err) => assert!(
                matches!(err, SubmitError::AlreadyLocked { .. } | SubmitError::InFlight { .. }),
                "unexpected error: {err}"
            ),
        }
    }

    assert_eq!(engine.user_aggregate(&alice()).await.unwrap().total_points, 10);
    let progress = engine
        .progress(&challenge(), &alice(), &EventScope::event("finals"))
        .await
        .unwrap();
    assert_eq!(progress.total_points_earned, 10);
    assert!(engine.in_flight().is_empty());
}

#[tokio::test]
async fn solver_count_is_event_wide() {
    let engine = engine();
    let finals = EventScope::event("finals");
    for user in ["alice", "bob"] {
        engine
            .submit(SubmitRequest::new(challenge(), UserId::new(user), finals.clone(), "flag{b}"))
            .await
            .unwrap();
    }
    engine
        .submit(SubmitRequest::new(challenge(), UserId::new("carol"), finals.clone(), "wrong"))
        .await
        .unwrap();
    engine
        .submit(SubmitRequest::new(challenge(), UserId::new("dave"), EventScope::Practice, "flag{a}"))
        .await
        .unwrap();

    assert_eq!(engine.solver_count(&challenge(), &finals).await.unwrap(), 2);
    assert_eq!(engine.solver_count(&challenge(), &EventScope::Practice).await.unwrap(), 1);
}

#[tokio::test]
async fn live_views_follow_submissions() {
    let engine = engine();
    let finals = EventScope::event("finals");

    let watcher = engine.watch_progress(&challenge(), &alice(), &finals).await.unwrap();
    let counter = engine.watch_solvers(&challenge(), &finals).await.unwrap();
    let mut progress_rx = watcher.subscribe();
    let mut solvers_rx = counter.subscribe();
    assert_eq!(counter.count(), 0);

    engine.submit(submit("flag{a}", finals.clone())).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), progress_rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress_rx.borrow().total_points_earned, 10);

    tokio::time::timeout(Duration::from_secs(2), solvers_rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*solvers_rx.borrow(), 1);
}

/// Ledger whose writes always fail.
struct BrokenLedger {
    inner: InMemoryLedger,
}

#[async_trait]
impl SubmissionLedger for BrokenLedger {
    async fn append(&self, _record: SubmissionAppend) -> StorageResult<Submission> {
        Err(StorageError::Backend("disk on fire".to_string()))
    }

    async fn append_scored(
        &self,
        _scope: &ScopeKey,
        _decide: AppendDecision<'_>,
    ) -> StorageResult<ScoredAppend> {
        Err(StorageError::Backend("disk on fire".to_string()))
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
impl AggregateStore for BrokenLedger {
    async fn user_aggregate(&self, user_id: &UserId) -> StorageResult<UserAggregate> {
        self.inner.user_aggregate(user_id).await
    }
}

#[tokio::test]
async fn persistence_failure_is_retryable_and_releases_guard() {
    let engine = ScoringEngine::new(
        catalog(),
        Arc::new(BrokenLedger {
            inner: InMemoryLedger::new(),
        }),
        EngineConfig::default(),
    );

    for _ in 0..2 {
        let err = engine
            .submit(submit("flag{a}", EventScope::Practice))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Persistence(_)));
        assert!(err.is_retryable());
    }
    assert!(engine.in_flight().is_empty());
    assert_eq!(engine.user_aggregate(&alice()).await.unwrap().total_points, 0);
}

/// Shared ledger whose first scope read waits until every tab has read.
struct TabLedger {
    inner: Arc<InMemoryLedger>,
    barrier: Arc<Barrier>,
    waited: AtomicBool,
}

impl TabLedger {
    fn new(inner: Arc<InMemoryLedger>, barrier: Arc<Barrier>) -> Self {
        Self {
            inner,
            barrier,
            waited: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SubmissionLedger for TabLedger {
    async fn append(&self, record: SubmissionAppend) -> StorageResult<Submission> {
        self.inner.append(record).await
    }

    async fn append_scored(
        &self,
        scope: &ScopeKey,
        decide: AppendDecision<'_>,
    ) -> StorageResult<ScoredAppend> {
        self.inner.append_scored(scope, decide).await
    }

    async fn query(&self, scope: &ScopeKey) -> StorageResult<Vec<Submission>> {
        let history = self.inner.query(scope).await?;
        if !self.waited.swap(true, Ordering::SeqCst) {
            self.barrier.wait().await;
        }
        Ok(history)
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
impl AggregateStore for TabLedger {
    async fn user_aggregate(&self, user_id: &UserId) -> StorageResult<UserAggregate> {
        self.inner.user_aggregate(user_id).await
    }
}

#[tokio::test]
async fn two_tabs_racing_past_the_fast_path_award_once() {
    let shared = Arc::new(InMemoryLedger::new());
    let barrier = Arc::new(Barrier::new(2));
    let tab = || {
        ScoringEngine::new(
            catalog(),
            Arc::new(TabLedger::new(shared.clone(), barrier.clone())),
            EngineConfig::default(),
        )
    };
    let (left, right) = (tab(), tab());

    // Both tabs project an empty history before either write lands, so the
    // award decision inside the atomic append is the only guard left.
    let (a, b) = tokio::join!(
        left.submit(submit("flag{a}", EventScope::Practice)),
        right.submit(submit("FLAG{A}", EventScope::Practice)),
    );
    let receipts = [a.unwrap(), b.unwrap()];

    let outcomes: Vec<_> = receipts.iter().map(|r| r.outcome).collect();
    assert!(outcomes.contains(&ResolutionOutcome::Awarded));
    assert!(outcomes.contains(&ResolutionOutcome::AlreadyCredited));
    assert_eq!(receipts.iter().filter(|r| r.points_awarded() > 0).count(), 1);
    assert!(receipts.iter().all(|r| r.is_correct()));

    assert_eq!(shared.user_aggregate(&alice()).await.unwrap().total_points, 10);
    let progress = left
        .progress(&challenge(), &alice(), &EventScope::Practice)
        .await
        .unwrap();
    assert_eq!(progress.total_points_earned, 10);
    assert_eq!(progress.ledger_size, 2);
    assert!(progress.is_locked(0));
}
