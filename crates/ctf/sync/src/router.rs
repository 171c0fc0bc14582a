use ctf_types::{ChallengeId, EventScope, Submission, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Default per-subscriber channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Subscription handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub uuid::Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which submissions a subscriber wants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionFilter {
    pub challenge_id: ChallengeId,
    /// Filter by user (None = all users)
    pub user_id: Option<UserId>,
    /// Filter by event scope (None = all scopes)
    pub event: Option<EventScope>,
}

impl SubmissionFilter {
    pub fn challenge(challenge_id: ChallengeId) -> Self {
        Self {
            challenge_id,
            user_id: None,
            event: None,
        }
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn event(mut self, event: EventScope) -> Self {
        self.event = Some(event);
        self
    }

    pub fn matches(&self, submission: &Submission) -> bool {
        let user_match = match &self.user_id {
            Some(user_id) => &submission.user_id == user_id,
            None => true,
        };
        let event_match = match &self.event {
            Some(event) => &submission.event == event,
            None => true,
        };
        submission.challenge_id == self.challenge_id && user_match && event_match
    }
}

struct Subscription {
    id: SubscriptionId,
    filter: SubmissionFilter,
    sender: mpsc::Sender<Submission>,
}

/// Fans durable submissions out to filtered subscribers.
pub struct SubmissionRouter {
    subscriptions: RwLock<Vec<Subscription>>,
    capacity: usize,
}

impl Default for SubmissionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionRouter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to submissions matching `filter`.
    pub async fn subscribe(
        &self,
        filter: SubmissionFilter,
    ) -> (SubscriptionId, mpsc::Receiver<Submission>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = SubscriptionId::new();

        debug!(subscription_id = ?id.0, challenge_id = %filter.challenge_id, "New subscription registered");
        self.subscriptions.write().await.push(Subscription {
            id: id.clone(),
            filter,
            sender,
        });

        (id, receiver)
    }

    /// Route a submission to all matching subscribers.
    /// Returns the number of subscribers that received it.
    pub async fn route(&self, submission: &Submission) -> usize {
        let subs = self.subscriptions.read().await;
        let mut delivered = 0;
        let mut closed_ids = Vec::new();

        for sub in subs.iter() {
            if !sub.filter.matches(submission) {
                continue;
            }
            match sub.sender.try_send(submission.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscription_id = ?sub.id.0,
                        submission = %submission.id,
                        "Subscriber channel full, dropping submission"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed_ids.push(sub.id.clone());
                }
            }
        }

        drop(subs);

        if !closed_ids.is_empty() {
            let mut subs = self.subscriptions.write().await;
            subs.retain(|s| !closed_ids.contains(&s.id));
            debug!(removed = closed_ids.len(), "Cleaned up closed subscriptions");
        }

        delivered
    }

    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        let mut subs = self.subscriptions.write().await;
        subs.retain(|s| s.id != *id);
        debug!(subscription_id = ?id.0, "Subscription removed");
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ctf_types::SubmissionId;

    fn submission(user: &str, event: EventScope) -> Submission {
        Submission {
            id: SubmissionId::generate(),
            challenge_id: ChallengeId::new("c1"),
            user_id: UserId::new(user),
            event,
            flag: "flag{a}".to_string(),
            is_correct: true,
            submitted_at: Utc::now(),
            points_awarded: 10,
            question_index: Some(0),
            question_id: None,
            question_points: 10,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let router = SubmissionRouter::new();
        let (_id, mut rx) = router
            .subscribe(SubmissionFilter::challenge(ChallengeId::new("c1")))
            .await;

        let s = submission("alice", EventScope::Practice);
        assert_eq!(router.route(&s).await, 1);
        assert_eq!(rx.recv().await.unwrap().id, s.id);
    }

    #[tokio::test]
    async fn user_and_event_filters() {
        let router = SubmissionRouter::new();
        let (_id, mut rx) = router
            .subscribe(
                SubmissionFilter::challenge(ChallengeId::new("c1"))
                    .user(UserId::new("alice"))
                    .event(EventScope::event("a")),
            )
            .await;

        assert_eq!(router.route(&submission("bob", EventScope::event("a"))).await, 0);
        assert_eq!(router.route(&submission("alice", EventScope::event("b"))).await, 0);
        assert_eq!(router.route(&submission("alice", EventScope::Practice)).await, 0);

        let hit = submission("alice", EventScope::event("a"));
        assert_eq!(router.route(&hit).await, 1);
        assert_eq!(rx.recv().await.unwrap().id, hit.id);
    }

    #[tokio::test]
    async fn other_challenge_is_filtered() {
        let router = SubmissionRouter::new();
        let (_id, _rx) = router
            .subscribe(SubmissionFilter::challenge(ChallengeId::new("c2")))
            .await;
        assert_eq!(router.route(&submission("alice", EventScope::Practice)).await, 0);
    }

    #[tokio::test]
    async fn full_channel_drops() {
        let router = SubmissionRouter::with_capacity(1);
        let (_id, mut rx) = router
            .subscribe(SubmissionFilter::challenge(ChallengeId::new("c1")))
            .await;

        assert_eq!(router.route(&submission("alice", EventScope::Practice)).await, 1);
        assert_eq!(router.route(&submission("alice", EventScope::Practice)).await, 0);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
        assert_eq!(router.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn unsubscribe() {
        let router = SubmissionRouter::new();
        let (id, _rx) = router
            .subscribe(SubmissionFilter::challenge(ChallengeId::new("c1")))
            .await;

        assert_eq!(router.subscription_count().await, 1);
        router.unsubscribe(&id).await;
        assert_eq!(router.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn closed_subscriber_cleaned_up() {
        let router = SubmissionRouter::new();
        let (_id, rx) = router
            .subscribe(SubmissionFilter::challenge(ChallengeId::new("c1")))
            .await;
        drop(rx);

        router.route(&submission("alice", EventScope::Practice)).await;
        assert_eq!(router.subscription_count().await, 0);
    }
}
