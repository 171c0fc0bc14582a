//! Per-scope progress watcher.
//!
//! Subscribes to the router before taking its initial snapshot so no
//! submission can fall between the snapshot and the first notification.

use crate::error::{SyncError, SyncResult};
use crate::router::{SubmissionFilter, SubmissionRouter, SubscriptionId};
use ctf_reconciler::{ChallengeProgress, ProjectionCache, Reconciler};
use ctf_storage::{ScoringStorage, SubmissionLedger};
use ctf_types::{Challenge, ScopeKey};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Projector {
    ledger: Arc<dyn ScoringStorage>,
    reconciler: Reconciler,
    cache: Arc<ProjectionCache>,
    challenge: Arc<Challenge>,
    scope: ScopeKey,
}

impl Projector {
    async fn project(&self) -> SyncResult<ChallengeProgress> {
        let history = self.ledger.query(&self.scope).await?;
        let progress = self
            .reconciler
            .reconcile(&self.challenge, &self.scope, &history);
        self.cache.put(progress.clone());
        Ok(progress)
    }
}

/// Live view of one (challenge, user, event) projection.
///
/// Dropping the watcher stops its task.
pub struct ProgressWatcher {
    scope: ScopeKey,
    receiver: watch::Receiver<ChallengeProgress>,
    subscription: SubscriptionId,
    router: Arc<SubmissionRouter>,
    task: JoinHandle<()>,
}

impl ProgressWatcher {
    pub async fn spawn(
        ledger: Arc<dyn ScoringStorage>,
        router: Arc<SubmissionRouter>,
        reconciler: Reconciler,
        cache: Arc<ProjectionCache>,
        challenge: Arc<Challenge>,
        scope: ScopeKey,
    ) -> SyncResult<Self> {
        if challenge.id != scope.challenge_id {
            return Err(SyncError::ScopeMismatch(format!(
                "watcher for {} given challenge {}",
                scope, challenge.id
            )));
        }

        let filter = SubmissionFilter::challenge(scope.challenge_id.clone())
            .user(scope.user_id.clone())
            .event(scope.event.clone());
        let (subscription, updates) = router.subscribe(filter).await;

        let projector = Projector {
            ledger,
            reconciler,
            cache,
            challenge,
            scope: scope.clone(),
        };
        let initial = match projector.project().await {
            Ok(progress) => progress,
            Err(err) => {
                router.unsubscribe(&subscription).await;
                return Err(err);
            }
        };

        let (sender, receiver) = watch::channel(initial);
        let task = tokio::spawn(run(projector, updates, sender));
        debug!(scope = %scope, "progress watcher started");

        Ok(Self {
            scope,
            receiver,
            subscription,
            router,
            task,
        })
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    /// Latest published progress.
    pub fn current(&self) -> ChallengeProgress {
        self.receiver.borrow().clone()
    }

    /// A receiver that sees every republished progress.
    pub fn subscribe(&self) -> watch::Receiver<ChallengeProgress> {
        self.receiver.clone()
    }

    /// Stop the task and drop the router subscription.
    pub async fn shutdown(self) {
        self.task.abort();
        self.router.unsubscribe(&self.subscription).await;
    }
}

impl Drop for ProgressWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    projector: Projector,
    mut updates: mpsc::Receiver<ctf_types::Submission>,
    sender: watch::Sender<ChallengeProgress>,
) {
    loop {
        tokio::select! {
            _ = sender.closed() => break,
            next = updates.recv() => {
                let Some(submission) = next else { break };
                // Coalesce a burst into one re-projection.
                while updates.try_recv().is_ok() {}

                projector.cache.invalidate(&projector.scope);
                match projector.project().await {
                    Ok(progress) => {
                        debug!(
                            scope = %projector.scope,
                            trigger = %submission.id,
                            total = progress.total_points_earned,
                            "progress republished"
                        );
                        sender.send_replace(progress);
                    }
                    Err(err) => {
                        warn!(scope = %projector.scope, error = %err, "progress refresh failed");
                    }
                }
            }
        }
    }
    debug!(scope = %projector.scope, "progress watcher stopped");
}
