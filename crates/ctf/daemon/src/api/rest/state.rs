//! Shared handler state

use chrono::{DateTime, Utc};
use ctf_engine::ScoringEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScoringEngine>,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<ScoringEngine>) -> Self {
        Self {
            engine,
            version: env!("CARGO_PKG_VERSION"),
            started_at: Utc::now(),
        }
    }

    /// Whole seconds since the daemon started.
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
