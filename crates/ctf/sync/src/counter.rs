use crate::error::SyncResult;
use crate::router::{SubmissionFilter, SubmissionRouter, SubscriptionId};
use ctf_storage::{ScoringStorage, SubmissionLedger};
use ctf_types::{ChallengeId, EventScope, Submission, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Event-wide count of distinct users with a correct submission.
///
/// Seeded from the ledger and recounted from it whenever the router reports
/// new submissions, so a notification dropped on a full channel is recovered
/// on the next wake-up. It never consults any user's projection.
pub struct SolverCounter {
    challenge_id: ChallengeId,
    event: EventScope,
    receiver: watch::Receiver<usize>,
    subscription: SubscriptionId,
    router: Arc<SubmissionRouter>,
    task: JoinHandle<()>,
}

impl SolverCounter {
    pub async fn spawn(
        ledger: Arc<dyn ScoringStorage>,
        router: Arc<SubmissionRouter>,
        challenge_id: ChallengeId,
        event: EventScope,
    ) -> SyncResult<Self> {
        let filter = SubmissionFilter::challenge(challenge_id.clone()).event(event.clone());
        let (subscription, updates) = router.subscribe(filter).await;

        let seed = match ledger.query_event(&challenge_id, &event).await {
            Ok(seed) => seed,
            Err(err) => {
                router.unsubscribe(&subscription).await;
                return Err(err.into());
            }
        };
        let solvers = correct_solvers(&seed);

        let (sender, receiver) = watch::channel(solvers.len());
        debug!(
            challenge_id = %challenge_id,
            event = %event,
            solvers = solvers.len(),
            "solver counter seeded"
        );
        let source = SolverSource {
            ledger,
            challenge_id: challenge_id.clone(),
            event: event.clone(),
        };
        let task = tokio::spawn(run(source, solvers, updates, sender));

        Ok(Self {
            challenge_id,
            event,
            receiver,
            subscription,
            router,
            task,
        })
    }

    pub fn challenge_id(&self) -> &ChallengeId {
        &self.challenge_id
    }

    pub fn event(&self) -> &EventScope {
        &self.event
    }

    pub fn count(&self) -> usize {
        *self.receiver.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.receiver.clone()
    }

    pub async fn shutdown(self) {
        self.task.abort();
        self.router.unsubscribe(&self.subscription).await;
    }
}

impl Drop for SolverCounter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Distinct users with at least one correct submission in `submissions`.
pub fn correct_solvers(submissions: &[Submission]) -> HashSet<UserId> {
    submissions
        .iter()
        .filter(|s| s.is_correct)
        .map(|s| s.user_id.clone())
        .collect()
}

struct SolverSource {
    ledger: Arc<dyn ScoringStorage>,
    challenge_id: ChallengeId,
    event: EventScope,
}

async fn run(
    source: SolverSource,
    mut solvers: HashSet<UserId>,
    mut updates: mpsc::Receiver<Submission>,
    sender: watch::Sender<usize>,
) {
    loop {
        tokio::select! {
            _ = sender.closed() => break,
            next = updates.recv() => {
                let Some(first) = next else { break };
                let mut burst = vec![first];
                while let Ok(submission) = updates.try_recv() {
                    burst.push(submission);
                }

                match source.ledger.query_event(&source.challenge_id, &source.event).await {
                    Ok(all) => solvers = correct_solvers(&all),
                    Err(err) => {
                        warn!(
                            challenge_id = %source.challenge_id,
                            event = %source.event,
                            error = %err,
                            "solver recount failed, applying routed submissions only"
                        );
                        solvers.extend(correct_solvers(&burst));
                    }
                }
                sender.send_if_modified(|count| {
                    let changed = *count != solvers.len();
                    *count = solvers.len();
                    changed
                });
            }
        }
    }
    debug!(challenge_id = %source.challenge_id, "solver counter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::LiveLedger;
    use chrono::Utc;
    use ctf_storage::memory::InMemoryLedger;
    use ctf_types::SubmissionAppend;
    use std::time::Duration;

    fn attempt(user: &str, event: EventScope, correct: bool) -> SubmissionAppend {
        SubmissionAppend {
            challenge_id: ChallengeId::new("c1"),
            user_id: UserId::new(user),
            event,
            flag: if correct { "flag{a}" } else { "nope" }.to_string(),
            is_correct: correct,
            submitted_at: Utc::now(),
            points_awarded: 0,
            question_index: Some(0),
            question_id: None,
            question_points: 10,
        }
    }

    #[tokio::test]
    async fn seeds_from_ledger_and_counts_distinct_users() {
        let router = Arc::new(SubmissionRouter::new());
        let ledger = Arc::new(LiveLedger::new(Arc::new(InMemoryLedger::new()), router.clone()));
        let event = EventScope::event("finals");

        ledger.append(attempt("alice", event.clone(), true)).await.unwrap();
        ledger.append(attempt("bob", event.clone(), false)).await.unwrap();
        ledger.append(attempt("carol", EventScope::Practice, true)).await.unwrap();

        let counter = SolverCounter::spawn(ledger.clone(), router, ChallengeId::new("c1"), event.clone())
            .await
            .unwrap();
        assert_eq!(counter.count(), 1);

        let mut rx = counter.subscribe();
        ledger.append(attempt("alice", event.clone(), true)).await.unwrap();
        ledger.append(attempt("bob", event.clone(), true)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn correct_solvers_dedupes_users() {
        let ledger_view: Vec<Submission> = [("alice", true), ("alice", true), ("bob", false), ("carol", true)]
            .into_iter()
            .map(|(user, correct)| {
                attempt(user, EventScope::Practice, correct)
                    .into_submission(ctf_types::SubmissionId::generate())
            })
            .collect();
        assert_eq!(correct_solvers(&ledger_view).len(), 2);
    }

    #[tokio::test]
    async fn recovers_solvers_dropped_on_full_channel() {
        let router = Arc::new(SubmissionRouter::with_capacity(2));
        let ledger = Arc::new(LiveLedger::new(Arc::new(InMemoryLedger::new()), router.clone()));
        let event = EventScope::event("finals");
        let counter = SolverCounter::spawn(ledger.clone(), router, ChallengeId::new("c1"), event.clone())
            .await
            .unwrap();
        let mut rx = counter.subscribe();

        for user in ["alice", "bob", "carol", "dave", "erin"] {
            ledger.append(attempt(user, event.clone(), true)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|count| *count == 5))
            .await
            .unwrap()
            .unwrap();
        let from_ledger = ledger.query_event(&ChallengeId::new("c1"), &event).await.unwrap();
        assert_eq!(counter.count(), correct_solvers(&from_ledger).len());
    }

    #[tokio::test]
    async fn other_event_is_ignored() {
        let router = Arc::new(SubmissionRouter::new());
        let ledger = Arc::new(LiveLedger::new(Arc::new(InMemoryLedger::new()), router.clone()));
        let counter = SolverCounter::spawn(
            ledger.clone(),
            router,
            ChallengeId::new("c1"),
            EventScope::event("a"),
        )
        .await
        .unwrap();
        let mut rx = counter.subscribe();

        ledger.append(attempt("alice", EventScope::event("b"), true)).await.unwrap();

        let changed = tokio::time::timeout(Duration::from_millis(100), rx.changed()).await;
        assert!(changed.is_err());
        assert_eq!(counter.count(), 0);
    }
}
