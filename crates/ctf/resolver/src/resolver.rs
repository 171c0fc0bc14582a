//! Award decision over one scope's history.

use crate::error::ResolveError;
use crate::matcher::{MatchProbe, MatcherChain};
use chrono::{DateTime, Utc};
use ctf_types::{Challenge, QuestionId, ScopeKey, Submission, SubmissionAppend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How a submission was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Correct, and this submission carries the award
    Awarded,
    /// Correct, but an earlier submission already carries the award
    AlreadyCredited,
    /// Matched a question but the flag is wrong
    Incorrect,
    /// No strategy matched any question
    Unmatched,
}

/// The question a submission resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedSummary {
    pub index: usize,
    pub question_id: Option<QuestionId>,
    pub points: u32,
    /// Name of the matcher that produced the hit
    pub strategy: String,
}

/// Resolver output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub is_correct: bool,
    pub points_to_award: u32,
    pub matched: Option<MatchedSummary>,
    pub outcome: ResolutionOutcome,
}

impl Resolution {
    fn unmatched() -> Self {
        Self {
            is_correct: false,
            points_to_award: 0,
            matched: None,
            outcome: ResolutionOutcome::Unmatched,
        }
    }

    /// Build the ledger record for this decision.
    pub fn to_append(
        &self,
        scope: &ScopeKey,
        flag: &str,
        submitted_at: DateTime<Utc>,
    ) -> SubmissionAppend {
        SubmissionAppend {
            challenge_id: scope.challenge_id.clone(),
            user_id: scope.user_id.clone(),
            event: scope.event.clone(),
            flag: flag.to_string(),
            is_correct: self.is_correct,
            submitted_at,
            points_awarded: self.points_to_award,
            question_index: self.matched.as_ref().map(|m| m.index),
            question_id: self.matched.as_ref().and_then(|m| m.question_id.clone()),
            question_points: self.matched.as_ref().map(|m| m.points).unwrap_or(0),
        }
    }
}

/// Pure scoring decision: which question, whether correct, whether points are owed.
#[derive(Debug, Clone, Default)]
pub struct ScoringResolver {
    chain: MatcherChain,
}

impl ScoringResolver {
    pub fn new(chain: MatcherChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &MatcherChain {
        &self.chain
    }

    /// Resolve `probe` against `challenge` given the scope's existing `history`.
    ///
    /// `history` must only contain submissions for `challenge`; the caller is
    /// responsible for scoping it to one (user, event).
    pub fn resolve(
        &self,
        challenge: &Challenge,
        probe: &MatchProbe<'_>,
        history: &[Submission],
    ) -> Result<Resolution, ResolveError> {
        challenge.validate()?;

        if let Some(foreign) = history.iter().find(|s| s.challenge_id != challenge.id) {
            return Err(ResolveError::ChallengeMismatch {
                expected: challenge.id.clone(),
                found: foreign.challenge_id.clone(),
            });
        }

        let Some(matched) = self.chain.resolve(challenge, probe) else {
            debug!(challenge_id = %challenge.id, "submission matched no question");
            return Ok(Resolution::unmatched());
        };

        let question = matched.question;
        let summary = MatchedSummary {
            index: question.index,
            question_id: question.question.id.clone(),
            points: question.question.points,
            strategy: matched.strategy.to_string(),
        };

        if !question.accepts(probe.flag) {
            debug!(
                challenge_id = %challenge.id,
                question_index = question.index,
                strategy = matched.strategy,
                "incorrect flag"
            );
            return Ok(Resolution {
                is_correct: false,
                points_to_award: 0,
                matched: Some(summary),
                outcome: ResolutionOutcome::Incorrect,
            });
        }

        // A zero-point question is credited by its first correct submission.
        let zero_point = question.question.points == 0;
        let credited = history.iter().any(|prior| {
            let counts = if zero_point {
                prior.is_correct
            } else {
                prior.is_awarding()
            };
            counts && self.chain.attribute(challenge, prior) == Some(question.index)
        });

        if credited {
            debug!(
                challenge_id = %challenge.id,
                question_index = question.index,
                "question already credited in this scope"
            );
            return Ok(Resolution {
                is_correct: true,
                points_to_award: 0,
                matched: Some(summary),
                outcome: ResolutionOutcome::AlreadyCredited,
            });
        }

        info!(
            challenge_id = %challenge.id,
            question_index = question.index,
            points = question.question.points,
            "award decided"
        );
        Ok(Resolution {
            is_correct: true,
            points_to_award: question.question.points,
            matched: Some(summary),
            outcome: ResolutionOutcome::Awarded,
        })
    }
}
