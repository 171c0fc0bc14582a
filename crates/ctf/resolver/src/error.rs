use ctf_types::{CatalogError, ChallengeId};
use thiserror::Error;

/// Errors raised while resolving a submission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("catalog integrity: {0}")]
    Catalog(#[from] CatalogError),

    #[error("submission belongs to challenge {found}, expected {expected}")]
    ChallengeMismatch {
        expected: ChallengeId,
        found: ChallengeId,
    },
}
