//! Flagline submission ledger.
//!
//! The ledger is the system of record for every flag attempt:
//! - submissions are append-only and never updated or deleted
//! - per-user aggregates (point total, solved set) are folded from awarding appends
//! - `append_scored` runs read-decide-write as one serializable unit so the
//!   at-most-once award scan cannot race a concurrent write
//!
//! Design stance:
//! - the ledger stores decisions, it does not make them; correctness and award
//!   amounts come from the caller's decision function
//! - PostgreSQL is the durable backend; the in-memory adapter is deterministic
//!   and intended for tests and single-process deployments

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::{AppendDecision, ScoredAppend};
pub use traits::{AggregateStore, ScoringStorage, SubmissionLedger};
