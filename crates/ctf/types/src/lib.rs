//! Flagline Types - shared contracts for the scoring engine
//!
//! Every other Flagline crate speaks in these types:
//!
//! - **Challenge / Question**: read-only catalog definitions (secret flags, points, ordering)
//! - **Submission**: one immutable attempt, as stored in the ledger
//! - **EventScope**: the competition instance a submission counts toward
//! - **ScopeKey**: (challenge, user, event), the unit of per-user progress
//! - **UserAggregate**: running point total and solved-challenge set
//!
//! Flags are compared after [`normalize_flag`] (trim + lowercase) everywhere.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod challenge;
pub mod ids;
pub mod submission;

pub use challenge::{normalize_flag, CatalogError, Challenge, Question, QuestionRef};
pub use ids::{ChallengeId, EventId, QuestionId, SubmissionId, UserId};
pub use submission::{EventScope, ScopeKey, Submission, SubmissionAppend, UserAggregate};
