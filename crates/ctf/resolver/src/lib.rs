//! Scoring Resolver: decides what a raw flag submission means.
//!
//! Given a challenge, a submission and the submitter's history within one
//! (challenge, user, event) scope, the resolver answers three questions:
//! which question does the text target, is it correct, and are points owed.
//!
//! Question matching is an explicit ordered [`MatcherChain`]:
//! flag match, then question-id match, then positional match. The same chain
//! attributes historical submissions, so the award scan and the state
//! projection always agree on which question a submission belongs to.

#![deny(unsafe_code)]

pub mod error;
pub mod matcher;
pub mod resolver;

pub use error::ResolveError;
pub use matcher::{
    FlagMatcher, MatchProbe, MatchedQuestion, MatcherChain, PositionalMatcher, QuestionIdMatcher,
    QuestionMatcher,
};
pub use resolver::{MatchedSummary, Resolution, ResolutionOutcome, ScoringResolver};
