//! Challenge catalog definitions
//!
//! A challenge owns an ordered list of questions. Single-question challenges
//! carry exactly one entry; the question's ordinal is its index in the list.

use crate::ids::{ChallengeId, QuestionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Normalize a flag for comparison: trim surrounding whitespace, lowercase.
pub fn normalize_flag(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A scored CTF task as supplied by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: ChallengeId,

    pub title: String,

    /// Point value of a single-question challenge
    #[serde(default)]
    pub points: u32,

    /// Declared point value of a multi-question challenge
    #[serde(default)]
    pub total_points: u32,

    #[serde(default)]
    pub has_multiple_questions: bool,

    /// Ordered question list; position is the question ordinal
    #[serde(default)]
    pub questions: Vec<Question>,

    /// Informational solver list maintained by the catalog owner
    #[serde(default)]
    pub solved_by: Vec<UserId>,
}

/// One independently-scored sub-question of a challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QuestionId>,

    /// Secret flag; never returned to players
    pub flag: String,

    pub points: u32,

    #[serde(default)]
    pub text: String,

    /// Optional hint such as `flag{...}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_format: Option<String>,
}

/// A question together with its ordinal position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionRef<'a> {
    pub index: usize,
    pub question: &'a Question,
}

impl QuestionRef<'_> {
    /// True when `raw` normalizes to this question's secret flag.
    pub fn accepts(&self, raw: &str) -> bool {
        normalize_flag(raw) == normalize_flag(&self.question.flag)
    }
}

impl Challenge {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn question(&self, index: usize) -> Option<QuestionRef<'_>> {
        self.questions
            .get(index)
            .map(|question| QuestionRef { index, question })
    }

    pub fn question_by_id(&self, id: &QuestionId) -> Option<QuestionRef<'_>> {
        self.iter_questions()
            .find(|q| q.question.id.as_ref() == Some(id))
    }

    pub fn iter_questions(&self) -> impl Iterator<Item = QuestionRef<'_>> {
        self.questions
            .iter()
            .enumerate()
            .map(|(index, question)| QuestionRef { index, question })
    }

    /// Points advertised for the whole challenge.
    pub fn declared_points(&self) -> u32 {
        if self.has_multiple_questions {
            self.total_points
        } else {
            self.points
        }
    }

    /// Check catalog integrity.
    ///
    /// Flags must be non-blank and unique per challenge after normalization,
    /// question ids must be unique, and a single-question challenge may not
    /// carry more than one question.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if !self.has_multiple_questions && self.questions.len() > 1 {
            return Err(CatalogError::ShapeMismatch {
                challenge_id: self.id.clone(),
                questions: self.questions.len(),
            });
        }

        let mut flags: HashMap<String, usize> = HashMap::new();
        let mut ids: HashMap<&QuestionId, usize> = HashMap::new();

        for q in self.iter_questions() {
            let normalized = normalize_flag(&q.question.flag);
            if normalized.is_empty() {
                return Err(CatalogError::EmptyFlag {
                    challenge_id: self.id.clone(),
                    index: q.index,
                });
            }
            if let Some(first) = flags.insert(normalized, q.index) {
                return Err(CatalogError::DuplicateFlag {
                    challenge_id: self.id.clone(),
                    first,
                    second: q.index,
                });
            }
            if let Some(id) = q.question.id.as_ref() {
                if let Some(first) = ids.insert(id, q.index) {
                    return Err(CatalogError::DuplicateQuestionId {
                        challenge_id: self.id.clone(),
                        question_id: id.clone(),
                        first,
                        second: q.index,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Catalog data-integrity errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("challenge {challenge_id}: questions {first} and {second} share the same flag")]
    DuplicateFlag {
        challenge_id: ChallengeId,
        first: usize,
        second: usize,
    },

    #[error("challenge {challenge_id}: question id {question_id} used by questions {first} and {second}")]
    DuplicateQuestionId {
        challenge_id: ChallengeId,
        question_id: QuestionId,
        first: usize,
        second: usize,
    },

    #[error("challenge {challenge_id}: question {index} has an empty flag")]
    EmptyFlag {
        challenge_id: ChallengeId,
        index: usize,
    },

    #[error("challenge {challenge_id}: single-question challenge has {questions} questions")]
    ShapeMismatch {
        challenge_id: ChallengeId,
        questions: usize,
    },
}
