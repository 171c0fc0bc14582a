use crate::catalog::ChallengeCatalog;
use crate::config::EngineConfig;
use crate::error::{EngineResult, SubmitError};
use crate::inflight::{InFlightKey, InFlightSet};
use chrono::Utc;
use ctf_reconciler::{history_for_display, ChallengeProgress, ProjectionCache, Reconciler};
use ctf_resolver::{MatchProbe, MatchedSummary, Resolution, ResolutionOutcome, ScoringResolver};
use ctf_storage::{AggregateStore, AppendDecision, ScoringStorage, StorageError, SubmissionLedger};
use ctf_sync::{correct_solvers, LiveLedger, ProgressWatcher, SolverCounter, SubmissionRouter};
use ctf_types::{
    Challenge, ChallengeId, EventScope, QuestionId, ScopeKey, Submission, UserAggregate, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One flag attempt as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub event: EventScope,
    pub flag: String,
    pub question_id: Option<QuestionId>,
    pub question_index: Option<usize>,
}

impl SubmitRequest {
    pub fn new(
        challenge_id: ChallengeId,
        user_id: UserId,
        event: EventScope,
        flag: impl Into<String>,
    ) -> Self {
        Self {
            challenge_id,
            user_id,
            event,
            flag: flag.into(),
            question_id: None,
            question_index: None,
        }
    }

    pub fn with_question_id(mut self, question_id: QuestionId) -> Self {
        self.question_id = Some(question_id);
        self
    }

    pub fn with_question_index(mut self, index: usize) -> Self {
        self.question_index = Some(index);
        self
    }

    pub fn scope(&self) -> ScopeKey {
        ScopeKey::new(
            self.challenge_id.clone(),
            self.user_id.clone(),
            self.event.clone(),
        )
    }

    fn probe(&self) -> MatchProbe<'_> {
        MatchProbe::new(&self.flag, self.question_id.as_ref(), self.question_index)
    }
}

/// Outcome of a persisted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub submission: Submission,
    pub outcome: ResolutionOutcome,
    pub matched: Option<MatchedSummary>,
    /// Scope progress including this submission
    pub progress: ChallengeProgress,
    pub aggregate: UserAggregate,
}

impl SubmitReceipt {
    pub fn is_correct(&self) -> bool {
        self.submission.is_correct
    }

    pub fn points_awarded(&self) -> u32 {
        self.submission.points_awarded
    }
}

/// The submission boundary.
pub struct ScoringEngine {
    catalog: Arc<dyn ChallengeCatalog>,
    ledger: Arc<LiveLedger>,
    router: Arc<SubmissionRouter>,
    resolver: ScoringResolver,
    reconciler: Reconciler,
    cache: Arc<ProjectionCache>,
    in_flight: Arc<InFlightSet>,
    config: EngineConfig,
}

impl ScoringEngine {
    pub fn new(
        catalog: Arc<dyn ChallengeCatalog>,
        storage: Arc<dyn ScoringStorage>,
        config: EngineConfig,
    ) -> Self {
        let router = Arc::new(SubmissionRouter::with_capacity(config.router_capacity));
        let ledger = Arc::new(LiveLedger::new(storage, router.clone()));
        let resolver = ScoringResolver::default();
        let reconciler = Reconciler::new(resolver.chain().clone(), config.lock_policy);

        Self {
            catalog,
            ledger,
            router,
            resolver,
            reconciler,
            cache: Arc::new(ProjectionCache::new()),
            in_flight: InFlightSet::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn ChallengeCatalog> {
        &self.catalog
    }

    pub fn router(&self) -> &Arc<SubmissionRouter> {
        &self.router
    }

    pub fn cache(&self) -> &Arc<ProjectionCache> {
        &self.cache
    }

    pub fn in_flight(&self) -> &Arc<InFlightSet> {
        &self.in_flight
    }

    /// Validate, resolve and persist one submission.
    #[instrument(skip(self, request), fields(challenge_id = %request.challenge_id, user_id = %request.user_id, event = %request.event))]
    pub async fn submit(&self, request: SubmitRequest) -> EngineResult<SubmitReceipt> {
        self.validate(&request)?;

        let challenge = self.challenge(&request.challenge_id).await?;
        challenge
            .validate()
            .map_err(|err| SubmitError::Integrity(err.to_string()))?;
        check_explicit_target(&challenge, &request)?;

        let scope = request.scope();
        let target = self
            .resolver
            .chain()
            .resolve(&challenge, &request.probe())
            .map(|m| m.question.index);

        let _guard = self
            .in_flight
            .try_acquire(InFlightKey::new(scope.clone(), target))
            .ok_or_else(|| SubmitError::InFlight {
                scope: scope.clone(),
            })?;

        let before = self.project(&challenge, &scope).await?;
        self.reconciler.guard(&before, target)?;

        let mut decided: Option<Resolution> = None;
        let slot = &mut decided;
        let resolver = &self.resolver;
        let definition: &Challenge = &challenge;
        let req = &request;
        let record_scope = &scope;
        let submitted_at = Utc::now();
        let decide: AppendDecision<'_> = Box::new(move |history: &[Submission]| {
            let resolution = resolver
                .resolve(definition, &req.probe(), history)
                .map_err(|err| StorageError::Rejected(err.to_string()))?;
            let record = resolution.to_append(record_scope, &req.flag, submitted_at);
            *slot = Some(resolution);
            Ok(record)
        });

        let scored = self.ledger.append_scored(&scope, decide).await?;
        let resolution = decided.ok_or_else(|| {
            SubmitError::Integrity("ledger committed without a scoring decision".to_string())
        })?;

        self.cache.invalidate(&scope);
        let progress = self.project(&challenge, &scope).await?;

        info!(
            submission = %scored.submission.id,
            outcome = ?resolution.outcome,
            points = scored.submission.points_awarded,
            total = scored.aggregate.total_points,
            "Submission recorded"
        );

        Ok(SubmitReceipt {
            submission: scored.submission,
            outcome: resolution.outcome,
            matched: resolution.matched,
            progress,
            aggregate: scored.aggregate,
        })
    }

    /// Current progress for one scope.
    pub async fn progress(
        &self,
        challenge_id: &ChallengeId,
        user_id: &UserId,
        event: &EventScope,
    ) -> EngineResult<ChallengeProgress> {
        let challenge = self.challenge(challenge_id).await?;
        let scope = ScopeKey::new(challenge_id.clone(), user_id.clone(), event.clone());
        self.project(&challenge, &scope).await
    }

    /// Scope history, newest first.
    pub async fn history(
        &self,
        challenge_id: &ChallengeId,
        user_id: &UserId,
        event: &EventScope,
    ) -> EngineResult<Vec<Submission>> {
        self.challenge(challenge_id).await?;
        let scope = ScopeKey::new(challenge_id.clone(), user_id.clone(), event.clone());
        let history = self.ledger.query(&scope).await?;
        Ok(history_for_display(&history))
    }

    /// Distinct users with a correct submission for the challenge in `event`.
    pub async fn solver_count(
        &self,
        challenge_id: &ChallengeId,
        event: &EventScope,
    ) -> EngineResult<usize> {
        self.challenge(challenge_id).await?;
        let submissions = self.ledger.query_event(challenge_id, event).await?;
        Ok(correct_solvers(&submissions).len())
    }

    /// Live progress for one scope; the watcher stops when dropped.
    pub async fn watch_progress(
        &self,
        challenge_id: &ChallengeId,
        user_id: &UserId,
        event: &EventScope,
    ) -> EngineResult<ProgressWatcher> {
        let challenge = self.challenge(challenge_id).await?;
        let scope = ScopeKey::new(challenge_id.clone(), user_id.clone(), event.clone());
        ProgressWatcher::spawn(
            self.ledger.clone(),
            self.router.clone(),
            self.reconciler.clone(),
            self.cache.clone(),
            challenge,
            scope,
        )
        .await
        .map_err(sync_error)
    }

    /// Live solver count; the counter stops when dropped.
    pub async fn watch_solvers(
        &self,
        challenge_id: &ChallengeId,
        event: &EventScope,
    ) -> EngineResult<SolverCounter> {
        self.challenge(challenge_id).await?;
        SolverCounter::spawn(
            self.ledger.clone(),
            self.router.clone(),
            challenge_id.clone(),
            event.clone(),
        )
        .await
        .map_err(sync_error)
    }

    pub async fn user_aggregate(&self, user_id: &UserId) -> EngineResult<UserAggregate> {
        Ok(self.ledger.user_aggregate(user_id).await?)
    }

    fn validate(&self, request: &SubmitRequest) -> EngineResult<()> {
        if request.flag.trim().is_empty() {
            return Err(SubmitError::Validation("flag must not be empty".to_string()));
        }
        if request.flag.len() > self.config.max_flag_len {
            return Err(SubmitError::Validation(format!(
                "flag exceeds {} bytes",
                self.config.max_flag_len
            )));
        }
        Ok(())
    }

    async fn challenge(&self, id: &ChallengeId) -> EngineResult<Arc<Challenge>> {
        self.catalog
            .get(id)
            .await
            .ok_or_else(|| SubmitError::NotFound(format!("challenge {}", id)))
    }

    async fn project(
        &self,
        challenge: &Challenge,
        scope: &ScopeKey,
    ) -> EngineResult<ChallengeProgress> {
        let history = self.ledger.query(scope).await?;
        if let Some(cached) = self.cache.get(scope, history.len()) {
            return Ok(cached);
        }
        debug!(scope = %scope, entries = history.len(), "reconciling");
        let progress = self.reconciler.reconcile(challenge, scope, &history);
        self.cache.put(progress.clone());
        Ok(progress)
    }
}

fn check_explicit_target(challenge: &Challenge, request: &SubmitRequest) -> EngineResult<()> {
    if let Some(id) = &request.question_id {
        if challenge.question_by_id(id).is_none() {
            return Err(SubmitError::NotFound(format!(
                "question {} in challenge {}",
                id, challenge.id
            )));
        }
    }
    if let Some(index) = request.question_index {
        if challenge.question(index).is_none() {
            return Err(SubmitError::NotFound(format!(
                "question #{} in challenge {}",
                index, challenge.id
            )));
        }
    }
    Ok(())
}

fn sync_error(err: ctf_sync::SyncError) -> SubmitError {
    match err {
        ctf_sync::SyncError::Storage(storage) => storage.into(),
        ctf_sync::SyncError::ScopeMismatch(reason) => SubmitError::Integrity(reason),
    }
}
