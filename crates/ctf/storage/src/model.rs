use crate::StorageResult;
use ctf_types::{Submission, SubmissionAppend, UserAggregate};
use serde::{Deserialize, Serialize};

/// Decision function evaluated inside the atomic append.
///
/// It receives the scope's full history as of the moment the write lock is
/// held and returns the record to insert. Returning an error aborts the append.
pub type AppendDecision<'a> =
    Box<dyn FnOnce(&[Submission]) -> StorageResult<SubmissionAppend> + Send + 'a>;

/// Result of an atomic scored append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredAppend {
    pub submission: Submission,
    /// Aggregate after the append was applied
    pub aggregate: UserAggregate,
}
