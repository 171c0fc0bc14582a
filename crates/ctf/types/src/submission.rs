//! Submission records and scoping

use crate::ids::{ChallengeId, EventId, QuestionId, SubmissionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Competition instance a submission counts toward.
///
/// On the wire this is the nullable `eventId`; `null` means practice mode.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(from = "Option<EventId>", into = "Option<EventId>")]
pub enum EventScope {
    #[default]
    Practice,
    Event(EventId),
}

impl EventScope {
    pub fn event(id: impl Into<String>) -> Self {
        EventScope::Event(EventId::new(id))
    }

    pub fn event_id(&self) -> Option<&EventId> {
        match self {
            EventScope::Practice => None,
            EventScope::Event(id) => Some(id),
        }
    }

    pub fn is_practice(&self) -> bool {
        matches!(self, EventScope::Practice)
    }
}

impl From<Option<EventId>> for EventScope {
    fn from(value: Option<EventId>) -> Self {
        match value {
            Some(id) => EventScope::Event(id),
            None => EventScope::Practice,
        }
    }
}

impl From<EventScope> for Option<EventId> {
    fn from(value: EventScope) -> Self {
        match value {
            EventScope::Practice => None,
            EventScope::Event(id) => Some(id),
        }
    }
}

impl fmt::Display for EventScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventScope::Practice => f.write_str("practice"),
            EventScope::Event(id) => write!(f, "event:{}", id),
        }
    }
}

/// The (challenge, user, event) triple that owns one independent progress state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeKey {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    #[serde(rename = "eventId")]
    pub event: EventScope,
}

impl ScopeKey {
    pub fn new(challenge_id: ChallengeId, user_id: UserId, event: EventScope) -> Self {
        Self {
            challenge_id,
            user_id,
            event,
        }
    }

    /// True when `submission` belongs to this scope.
    pub fn contains(&self, submission: &Submission) -> bool {
        submission.challenge_id == self.challenge_id
            && submission.user_id == self.user_id
            && submission.event == self.event
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.challenge_id, self.user_id, self.event)
    }
}

/// One immutable ledger entry.
///
/// `is_correct` and `points_awarded` are decided once, at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    #[serde(rename = "eventId")]
    pub event: EventScope,
    /// Raw submitted text, exactly as entered
    pub flag: String,
    pub is_correct: bool,
    pub submitted_at: DateTime<Utc>,
    pub points_awarded: u32,
    /// Ordinal of the targeted or matched question; `None` when nothing matched
    pub question_index: Option<usize>,
    pub question_id: Option<QuestionId>,
    pub question_points: u32,
}

impl Submission {
    pub fn scope(&self) -> ScopeKey {
        ScopeKey::new(
            self.challenge_id.clone(),
            self.user_id.clone(),
            self.event.clone(),
        )
    }

    pub fn is_awarding(&self) -> bool {
        self.points_awarded > 0
    }
}

/// Append payload. Identity is assigned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAppend {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    #[serde(rename = "eventId")]
    pub event: EventScope,
    pub flag: String,
    pub is_correct: bool,
    pub submitted_at: DateTime<Utc>,
    pub points_awarded: u32,
    pub question_index: Option<usize>,
    pub question_id: Option<QuestionId>,
    pub question_points: u32,
}

impl SubmissionAppend {
    pub fn scope(&self) -> ScopeKey {
        ScopeKey::new(
            self.challenge_id.clone(),
            self.user_id.clone(),
            self.event.clone(),
        )
    }

    /// Materialize the stored record under `id`.
    pub fn into_submission(self, id: SubmissionId) -> Submission {
        Submission {
            id,
            challenge_id: self.challenge_id,
            user_id: self.user_id,
            event: self.event,
            flag: self.flag,
            is_correct: self.is_correct,
            submitted_at: self.submitted_at,
            points_awarded: self.points_awarded,
            question_index: self.question_index,
            question_id: self.question_id,
            question_points: self.question_points,
        }
    }
}

/// Per-user running totals, mutated only by awarding appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAggregate {
    pub user_id: UserId,
    pub total_points: u64,
    pub solved_challenge_ids: BTreeSet<ChallengeId>,
}

impl UserAggregate {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            total_points: 0,
            solved_challenge_ids: BTreeSet::new(),
        }
    }

    /// Apply an awarding submission: additive total, idempotent set union.
    pub fn apply_award(&mut self, submission: &Submission) {
        if submission.is_awarding() {
            self.total_points += u64::from(submission.points_awarded);
            self.solved_challenge_ids
                .insert(submission.challenge_id.clone());
        }
    }
}
