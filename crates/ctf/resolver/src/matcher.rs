//! Question matching strategies.
//!
//! Each strategy looks at a probe (raw flag plus optional explicit target)
//! and may return a question. [`MatcherChain`] applies strategies in order
//! and the first non-empty result wins.

use ctf_types::{normalize_flag, Challenge, QuestionId, QuestionRef, Submission};
use std::fmt;
use std::sync::Arc;

/// What a matcher gets to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchProbe<'a> {
    /// Raw submitted text
    pub flag: &'a str,
    /// Explicit question identifier, if the client targeted one
    pub question_id: Option<&'a QuestionId>,
    /// Explicit question ordinal, if the client targeted one
    pub question_index: Option<usize>,
}

impl<'a> MatchProbe<'a> {
    pub fn new(
        flag: &'a str,
        question_id: Option<&'a QuestionId>,
        question_index: Option<usize>,
    ) -> Self {
        Self {
            flag,
            question_id,
            question_index,
        }
    }

    /// Probe carrying only the flag text.
    pub fn flag_only(flag: &'a str) -> Self {
        Self::new(flag, None, None)
    }

    /// Re-probe a stored submission with the fields it was recorded with.
    pub fn from_submission(submission: &'a Submission) -> Self {
        Self::new(
            &submission.flag,
            submission.question_id.as_ref(),
            submission.question_index,
        )
    }
}

/// A single matching strategy.
pub trait QuestionMatcher: Send + Sync {
    /// Stable strategy name, used in logs and resolutions.
    fn name(&self) -> &'static str;

    fn find<'c>(&self, challenge: &'c Challenge, probe: &MatchProbe<'_>) -> Option<QuestionRef<'c>>;
}

/// Normalized exact match against every question's secret flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlagMatcher;

impl QuestionMatcher for FlagMatcher {
    fn name(&self) -> &'static str {
        "flag"
    }

    fn find<'c>(&self, challenge: &'c Challenge, probe: &MatchProbe<'_>) -> Option<QuestionRef<'c>> {
        let normalized = normalize_flag(probe.flag);
        if normalized.is_empty() {
            return None;
        }
        challenge
            .iter_questions()
            .find(|q| normalize_flag(&q.question.flag) == normalized)
    }
}

/// Equality on the explicit question id.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuestionIdMatcher;

impl QuestionMatcher for QuestionIdMatcher {
    fn name(&self) -> &'static str {
        "question-id"
    }

    fn find<'c>(&self, challenge: &'c Challenge, probe: &MatchProbe<'_>) -> Option<QuestionRef<'c>> {
        probe
            .question_id
            .and_then(|id| challenge.question_by_id(id))
    }
}

/// Fallback on the explicit question ordinal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositionalMatcher;

impl QuestionMatcher for PositionalMatcher {
    fn name(&self) -> &'static str {
        "position"
    }

    fn find<'c>(&self, challenge: &'c Challenge, probe: &MatchProbe<'_>) -> Option<QuestionRef<'c>> {
        probe
            .question_index
            .and_then(|index| challenge.question(index))
    }
}

/// A question picked by the chain, with the strategy that picked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedQuestion<'c> {
    pub question: QuestionRef<'c>,
    pub strategy: &'static str,
}

/// Ordered list of matching strategies.
#[derive(Clone)]
pub struct MatcherChain {
    matchers: Vec<Arc<dyn QuestionMatcher>>,
}

impl MatcherChain {
    pub fn new(matchers: Vec<Arc<dyn QuestionMatcher>>) -> Self {
        Self { matchers }
    }

    /// Flag, then question id, then position.
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(FlagMatcher),
            Arc::new(QuestionIdMatcher),
            Arc::new(PositionalMatcher),
        ])
    }

    pub fn resolve<'c>(
        &self,
        challenge: &'c Challenge,
        probe: &MatchProbe<'_>,
    ) -> Option<MatchedQuestion<'c>> {
        self.matchers.iter().find_map(|matcher| {
            matcher.find(challenge, probe).map(|question| MatchedQuestion {
                question,
                strategy: matcher.name(),
            })
        })
    }

    /// Ordinal of the question a stored submission is attributed to.
    pub fn attribute(&self, challenge: &Challenge, submission: &Submission) -> Option<usize> {
        self.resolve(challenge, &MatchProbe::from_submission(submission))
            .map(|m| m.question.index)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }
}

impl Default for MatcherChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for MatcherChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherChain")
            .field("matchers", &self.names())
            .finish()
    }
}
