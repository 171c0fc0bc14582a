//! Flagline Live Sync
//!
//! Keeps derived state current while submissions arrive:
//!
//! - [`SubmissionRouter`]: filtered fan-out of durable submissions
//! - [`LiveLedger`]: ledger wrapper that routes every successful append
//! - [`ProgressWatcher`]: per-scope task republishing reconciled progress
//! - [`SolverCounter`]: event-wide count of distinct correct solvers

#![deny(unsafe_code)]

pub mod counter;
pub mod error;
pub mod live;
pub mod router;
pub mod watcher;

pub use counter::{correct_solvers, SolverCounter};
pub use error::{SyncError, SyncResult};
pub use live::LiveLedger;
pub use router::{SubmissionFilter, SubmissionRouter, SubscriptionId};
pub use watcher::ProgressWatcher;
