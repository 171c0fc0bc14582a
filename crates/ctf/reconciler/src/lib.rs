//! Question State Reconciler
//!
//! Rebuilds per-question progress for one (challenge, user, event) scope from
//! the append-only submission history. The projection is a pure function of
//! the history and the challenge definition; it is never mutated in place.
//!
//! - [`Reconciler::reconcile`]: history → [`ChallengeProgress`]
//! - [`Reconciler::guard`]: fast-path rejection of locked targets
//! - [`ProjectionCache`]: last projection per scope, keyed by ledger size
//! - [`history_for_display`]: newest-first view of a history

#![deny(unsafe_code)]

pub mod cache;
pub mod display;
pub mod error;
pub mod projection;

pub use cache::ProjectionCache;
pub use display::history_for_display;
pub use error::{ReconcileError, ReconcileResult};
pub use projection::{ChallengeProgress, LockPolicy, QuestionState, QuestionStatus, Reconciler};
