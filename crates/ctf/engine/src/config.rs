use ctf_reconciler::LockPolicy;
use serde::{Deserialize, Serialize};

/// Default upper bound on submitted flag length, in bytes.
pub const DEFAULT_MAX_FLAG_LEN: usize = 1024;

/// Scoring engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When a solved question stops accepting submissions
    pub lock_policy: LockPolicy,

    /// Longest accepted flag before trimming
    pub max_flag_len: usize,

    /// Per-subscriber buffer of the submission router
    pub router_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_policy: LockPolicy::AwardGated,
            max_flag_len: DEFAULT_MAX_FLAG_LEN,
            router_capacity: ctf_sync::router::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
