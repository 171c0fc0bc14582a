//! Flagline Scoring Engine
//!
//! The submission boundary of the platform. A submission passes through:
//!
//! 1. input validation (blank or over-long flags never reach the ledger)
//! 2. catalog lookup and explicit-target checks
//! 3. the in-flight guard, one pending submission per (scope, target)
//! 4. the fast-path lock guard over the reconciled projection
//! 5. the atomic scored append, where the resolver makes the award decision
//!    against the history the ledger holds under lock
//!
//! Every failure is a [`SubmitError`] value; a submission is either fully
//! persisted or not persisted at all.

#![deny(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod inflight;

pub use catalog::{CatalogLoadError, ChallengeCatalog, InMemoryCatalog};
pub use config::EngineConfig;
pub use engine::{ScoringEngine, SubmitReceipt, SubmitRequest};
pub use error::{EngineResult, SubmitError};
pub use inflight::{InFlightGuard, InFlightKey, InFlightSet};
