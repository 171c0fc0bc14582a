//! Projection of one scope's history into per-question state.

use crate::error::{ReconcileError, ReconcileResult};
use ctf_resolver::MatcherChain;
use ctf_types::{Challenge, ChallengeId, EventScope, QuestionId, ScopeKey, Submission, SubmissionId, UserId};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-question lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    Unsolved,
    SolvedAwarded,
    /// Correct submissions exist but none carries points
    SolvedUnawarded,
}

/// When a solved question stops accepting submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Locked once solved with points earned; SOLVED_UNAWARDED stays open
    #[default]
    AwardGated,
    /// Locked as soon as any correct submission exists
    CorrectnessGated,
}

impl LockPolicy {
    pub fn is_locked(self, is_solved: bool, points_earned: u32) -> bool {
        match self {
            LockPolicy::AwardGated => is_solved && points_earned > 0,
            LockPolicy::CorrectnessGated => is_solved,
        }
    }
}

/// Derived state of one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionState {
    pub index: usize,
    pub question_id: Option<QuestionId>,
    pub points: u32,
    pub is_solved: bool,
    pub points_earned: u32,
    pub locked: bool,
    pub status: QuestionStatus,
    /// Attributed submissions in (submittedAt, id) order
    pub submissions: Vec<SubmissionId>,
}

/// Derived progress for one (challenge, user, event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeProgress {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    #[serde(rename = "eventId")]
    pub event: EventScope,
    pub lock_policy: LockPolicy,
    pub questions: Vec<QuestionState>,
    pub solved_count: usize,
    pub total_question_count: usize,
    pub total_points_earned: u64,
    pub available_points: u64,
    pub fully_solved: bool,
    /// Submissions no question could be attributed to
    pub unattributed: Vec<SubmissionId>,
    /// Number of in-scope submissions this projection was built from
    pub ledger_size: usize,
}

impl ChallengeProgress {
    pub fn question(&self, index: usize) -> Option<&QuestionState> {
        self.questions.get(index)
    }

    pub fn is_locked(&self, index: usize) -> bool {
        self.question(index).map(|q| q.locked).unwrap_or(false)
    }

    pub fn scope(&self) -> ScopeKey {
        ScopeKey::new(
            self.challenge_id.clone(),
            self.user_id.clone(),
            self.event.clone(),
        )
    }
}

#[derive(Default)]
struct Tally {
    is_solved: bool,
    awards: Vec<u32>,
    submissions: Vec<SubmissionId>,
}

/// Pure projection of ledger history.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    chain: MatcherChain,
    policy: LockPolicy,
}

impl Reconciler {
    pub fn new(chain: MatcherChain, policy: LockPolicy) -> Self {
        Self { chain, policy }
    }

    pub fn with_policy(policy: LockPolicy) -> Self {
        Self::new(MatcherChain::standard(), policy)
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    pub fn chain(&self) -> &MatcherChain {
        &self.chain
    }

    /// Rebuild progress for `scope` from `history`.
    ///
    /// Submissions outside `scope` are ignored. The result does not depend on
    /// the order of `history`.
    pub fn reconcile(
        &self,
        challenge: &Challenge,
        scope: &ScopeKey,
        history: &[Submission],
    ) -> ChallengeProgress {
        let mut ordered: Vec<&Submission> = history
            .iter()
            .filter(|s| {
                let inside = scope.contains(s);
                if !inside {
                    warn!(submission = %s.id, scope = %scope, "ignoring submission outside scope");
                }
                inside
            })
            .collect();
        ordered.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut tallies: Vec<Tally> = (0..challenge.question_count())
            .map(|_| Tally::default())
            .collect();
        let mut unattributed = Vec::new();

        for submission in &ordered {
            match self.chain.attribute(challenge, submission) {
                Some(index) => {
                    let tally = &mut tallies[index];
                    tally.submissions.push(submission.id);
                    tally.is_solved |= submission.is_correct;
                    if submission.is_awarding() {
                        tally.awards.push(submission.points_awarded);
                    }
                }
                None => unattributed.push(submission.id),
            }
        }

        let questions: Vec<QuestionState> = challenge
            .iter_questions()
            .zip(tallies)
            .map(|(q, tally)| {
                if tally.awards.len() > 1 {
                    warn!(
                        scope = %scope,
                        question_index = q.index,
                        awards = tally.awards.len(),
                        "multiple awarding submissions for one question"
                    );
                }
                let points_earned = tally.awards.iter().copied().max().unwrap_or(0);
                let status = match (tally.is_solved, points_earned > 0) {
                    (false, _) => QuestionStatus::Unsolved,
                    (true, true) => QuestionStatus::SolvedAwarded,
                    (true, false) => QuestionStatus::SolvedUnawarded,
                };
                QuestionState {
                    index: q.index,
                    question_id: q.question.id.clone(),
                    points: q.question.points,
                    is_solved: tally.is_solved,
                    points_earned,
                    locked: self.policy.is_locked(tally.is_solved, points_earned),
                    status,
                    submissions: tally.submissions,
                }
            })
            .collect();

        let solved_count = questions.iter().filter(|q| q.is_solved).count();
        let total_question_count = questions.len();
        let total_points_earned = questions.iter().map(|q| u64::from(q.points_earned)).sum();
        let available_points = questions.iter().map(|q| u64::from(q.points)).sum();

        ChallengeProgress {
            challenge_id: scope.challenge_id.clone(),
            user_id: scope.user_id.clone(),
            event: scope.event.clone(),
            lock_policy: self.policy,
            questions,
            solved_count,
            total_question_count,
            total_points_earned,
            available_points,
            fully_solved: total_question_count > 0 && solved_count == total_question_count,
            unattributed,
            ledger_size: ordered.len(),
        }
    }

    /// Reject a submission aimed at a locked question.
    ///
    /// `target` is the question the new submission resolves to; `None` always
    /// passes. The atomic award decision stays authoritative.
    pub fn guard(&self, progress: &ChallengeProgress, target: Option<usize>) -> ReconcileResult<()> {
        match target {
            Some(index) if progress.is_locked(index) => Err(ReconcileError::AlreadyLocked {
                challenge_id: progress.challenge_id.clone(),
                question_index: index,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ctf_types::Question;
    use proptest::prelude::*;

    fn two_part() -> Challenge {
        Challenge {
            id: ChallengeId::new("c1"),
            title: "Two parts".to_string(),
            points: 0,
            total_points: 30,
            has_multiple_questions: true,
            questions: vec![
                Question {
                    id: None,
                    flag: "flag{a}".to_string(),
                    points: 10,
                    text: String::new(),
                    flag_format: None,
                },
                Question {
                    id: None,
                    flag: "flag{b}".to_string(),
                    points: 20,
                    text: String::new(),
                    flag_format: None,
                },
            ],
            solved_by: vec![],
        }
    }

    fn scope(event: EventScope) -> ScopeKey {
        ScopeKey::new(ChallengeId::new("c1"), UserId::new("alice"), event)
    }

    fn submission(
        event: EventScope,
        secs: i64,
        flag: &str,
        correct: bool,
        index: Option<usize>,
        points: u32,
    ) -> Submission {
        Submission {
            id: SubmissionId::generate(),
            challenge_id: ChallengeId::new("c1"),
            user_id: UserId::new("alice"),
            event,
            flag: flag.to_string(),
            is_correct: correct,
            submitted_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
            points_awarded: points,
            question_index: index,
            question_id: None,
            question_points: index.map(|i| [10, 20][i]).unwrap_or(0),
        }
    }

    #[test]
    fn empty_history_is_unsolved() {
        let p = Reconciler::default().reconcile(&two_part(), &scope(EventScope::Practice), &[]);
        assert_eq!(p.solved_count, 0);
        assert_eq!(p.total_question_count, 2);
        assert_eq!(p.total_points_earned, 0);
        assert_eq!(p.available_points, 30);
        assert!(!p.fully_solved);
        assert!(p.questions.iter().all(|q| q.status == QuestionStatus::Unsolved));
    }

    #[test]
    fn one_award_solves_and_locks_one_question() {
        let history = vec![submission(EventScope::Practice, 1, "flag{a}", true, Some(0), 10)];
        let p = Reconciler::default().reconcile(&two_part(), &scope(EventScope::Practice), &history);

        assert!(p.questions[0].is_solved);
        assert!(p.questions[0].locked);
        assert_eq!(p.questions[0].points_earned, 10);
        assert_eq!(p.questions[0].status, QuestionStatus::SolvedAwarded);
        assert_eq!(p.questions[0].submissions, vec![history[0].id]);
        assert_eq!(p.total_points_earned, 10);
        assert_eq!(p.solved_count, 1);
        assert!(!p.questions[1].is_solved);
    }

    #[test]
    fn both_questions_fully_solve() {
        let history = vec![
            submission(EventScope::Practice, 1, "flag{a}", true, Some(0), 10),
            submission(EventScope::Practice, 2, "flag{a}", true, Some(0), 0),
            submission(EventScope::Practice, 3, "FLAG{B}", true, Some(1), 20),
        ];
        let p = Reconciler::default().reconcile(&two_part(), &scope(EventScope::Practice), &history);

        assert_eq!(p.total_points_earned, 30);
        assert_eq!(p.solved_count, 2);
        assert!(p.fully_solved);
        assert_eq!(p.questions[0].submissions.len(), 2);
    }

    #[test]
    fn unmatched_submission_changes_nothing() {
        let before = Reconciler::default().reconcile(&two_part(), &scope(EventScope::Practice), &[]);
        let wrong = submission(EventScope::Practice, 1, "wrong", false, None, 0);
        let after = Reconciler::default().reconcile(
            &two_part(),
            &scope(EventScope::Practice),
            std::slice::from_ref(&wrong),
        );

        assert_eq!(after.questions, before.questions);
        assert_eq!(after.unattributed, vec![wrong.id]);
        assert_eq!(after.ledger_size, 1);
    }

    #[test]
    fn events_are_isolated() {
        let history = vec![submission(EventScope::event("eventA"), 1, "flag{a}", true, Some(0), 10)];
        let reconciler = Reconciler::default();

        let a = reconciler.reconcile(&two_part(), &scope(EventScope::event("eventA")), &history);
        let b = reconciler.reconcile(&two_part(), &scope(EventScope::event("eventB")), &history);

        assert!(a.questions[0].is_solved);
        assert!(!b.questions[0].is_solved);
        assert_eq!(b.ledger_size, 0);
    }

    #[test]
    fn zero_question_challenge_is_never_fully_solved() {
        let mut empty = two_part();
        empty.questions.clear();
        let p = Reconciler::default().reconcile(&empty, &scope(EventScope::Practice), &[]);
        assert_eq!(p.solved_count, 0);
        assert_eq!(p.total_question_count, 0);
        assert!(!p.fully_solved);
    }

    #[test]
    fn solved_unawarded_under_award_gated_stays_open() {
        let history = vec![submission(EventScope::Practice, 1, "flag{a}", true, Some(0), 0)];
        let reconciler = Reconciler::with_policy(LockPolicy::AwardGated);
        let p = reconciler.reconcile(&two_part(), &scope(EventScope::Practice), &history);

        assert_eq!(p.questions[0].status, QuestionStatus::SolvedUnawarded);
        assert!(!p.questions[0].locked);
        assert!(reconciler.guard(&p, Some(0)).is_ok());
    }

    #[test]
    fn solved_unawarded_under_correctness_gated_is_terminal() {
        let history = vec![submission(EventScope::Practice, 1, "flag{a}", true, Some(0), 0)];
        let reconciler = Reconciler::with_policy(LockPolicy::CorrectnessGated);
        let p = reconciler.reconcile(&two_part(), &scope(EventScope::Practice), &history);

        assert_eq!(p.questions[0].status, QuestionStatus::SolvedUnawarded);
        assert!(p.questions[0].locked);
        assert_eq!(
            reconciler.guard(&p, Some(0)),
            Err(ReconcileError::AlreadyLocked {
                challenge_id: ChallengeId::new("c1"),
                question_index: 0,
            })
        );
    }

    #[test]
    fn guard_passes_unlocked_and_untargeted() {
        let history = vec![submission(EventScope::Practice, 1, "flag{a}", true, Some(0), 10)];
        let reconciler = Reconciler::default();
        let p = reconciler.reconcile(&two_part(), &scope(EventScope::Practice), &history);

        assert!(reconciler.guard(&p, Some(0)).is_err());
        assert!(reconciler.guard(&p, Some(1)).is_ok());
        assert!(reconciler.guard(&p, Some(7)).is_ok());
        assert!(reconciler.guard(&p, None).is_ok());
    }

    #[test]
    fn legacy_double_award_takes_the_maximum() {
        let history = vec![
            submission(EventScope::Practice, 1, "flag{a}", true, Some(0), 10),
            submission(EventScope::Practice, 1, "flag{a}", true, Some(0), 10),
        ];
        let p = Reconciler::default().reconcile(&two_part(), &scope(EventScope::Practice), &history);
        assert_eq!(p.questions[0].points_earned, 10);
        assert_eq!(p.total_points_earned, 10);
    }

    #[test]
    fn progress_serializes_camel_case() {
        let p = Reconciler::default().reconcile(&two_part(), &scope(EventScope::event("e1")), &[]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["eventId"], "e1");
        assert_eq!(json["totalQuestionCount"], 2);
        assert_eq!(json["questions"][0]["status"], "UNSOLVED");
    }

    fn arb_history() -> impl Strategy<Value = Vec<Submission>> {
        let entry = (0i64..50, 0usize..4, prop::bool::ANY).prop_map(|(secs, kind, awarded)| {
            match kind {
                0 => submission(EventScope::Practice, secs, "flag{a}", true, Some(0), if awarded { 10 } else { 0 }),
                1 => submission(EventScope::Practice, secs, "flag{b}", true, Some(1), if awarded { 20 } else { 0 }),
                2 => submission(EventScope::Practice, secs, "nope", false, Some(1), 0),
                _ => submission(EventScope::Practice, secs, "wrong", false, None, 0),
            }
        });
        prop::collection::vec(entry, 0..16)
    }

    proptest! {
        #[test]
        fn projection_is_order_independent(
            (history, shuffled) in arb_history().prop_flat_map(|h| {
                let original = h.clone();
                (Just(original), Just(h).prop_shuffle())
            })
        ) {
            let reconciler = Reconciler::default();
            let a = reconciler.reconcile(&two_part(), &scope(EventScope::Practice), &history);
            let b = reconciler.reconcile(&two_part(), &scope(EventScope::Practice), &shuffled);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn total_is_sum_of_question_points(history in arb_history()) {
            for policy in [LockPolicy::AwardGated, LockPolicy::CorrectnessGated] {
                let p = Reconciler::with_policy(policy)
                    .reconcile(&two_part(), &scope(EventScope::Practice), &history);
                let sum: u64 = p.questions.iter().map(|q| u64::from(q.points_earned)).sum();
                prop_assert_eq!(p.total_points_earned, sum);
                prop_assert!(p.total_points_earned <= p.available_points);
                prop_assert_eq!(p.fully_solved, p.solved_count == p.total_question_count);
                for q in &p.questions {
                    if policy == LockPolicy::AwardGated {
                        prop_assert_eq!(q.locked, q.is_solved && q.points_earned > 0);
                    } else {
                        prop_assert_eq!(q.locked, q.is_solved);
                    }
                }
            }
        }
    }
}
