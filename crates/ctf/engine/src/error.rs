use ctf_reconciler::ReconcileError;
use ctf_storage::StorageError;
use ctf_types::{ChallengeId, ScopeKey};
use thiserror::Error;

pub type EngineResult<T> = Result<T, SubmitError>;

/// Failures at the submission boundary.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("question {question_index} of challenge {challenge_id} is already solved")]
    AlreadyLocked {
        challenge_id: ChallengeId,
        question_index: usize,
    },

    #[error("a submission for {scope} is already in flight")]
    InFlight { scope: ScopeKey },

    #[error("persistence failure: {0}")]
    Persistence(#[source] StorageError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("data integrity error: {0}")]
    Integrity(String),
}

impl SubmitError {
    /// Whether the same submission may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Persistence(_) | SubmitError::InFlight { .. })
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "VALIDATION",
            SubmitError::AlreadyLocked { .. } => "ALREADY_LOCKED",
            SubmitError::InFlight { .. } => "IN_FLIGHT",
            SubmitError::Persistence(_) => "PERSISTENCE",
            SubmitError::NotFound(_) => "NOT_FOUND",
            SubmitError::Integrity(_) => "INTEGRITY",
        }
    }
}

impl From<StorageError> for SubmitError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Rejected(reason) => SubmitError::Integrity(reason),
            StorageError::InvariantViolation(reason) => SubmitError::Integrity(reason),
            other => SubmitError::Persistence(other),
        }
    }
}

impl From<ReconcileError> for SubmitError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::AlreadyLocked {
                challenge_id,
                question_index,
            } => SubmitError::AlreadyLocked {
                challenge_id,
                question_index,
            },
        }
    }
}
