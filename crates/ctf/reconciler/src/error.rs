use ctf_types::ChallengeId;
use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("question {question_index} of challenge {challenge_id} is already locked")]
    AlreadyLocked {
        challenge_id: ChallengeId,
        question_index: usize,
    },
}
