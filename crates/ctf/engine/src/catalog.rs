//! Read-only challenge catalog.

use async_trait::async_trait;
use ctf_types::{CatalogError, Challenge, ChallengeId};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog integrity: {0}")]
    Integrity(#[from] CatalogError),

    #[error("challenge {0} defined more than once")]
    DuplicateChallenge(ChallengeId),
}

/// Challenge lookup used by the engine. Implementations never mutate definitions.
#[async_trait]
pub trait ChallengeCatalog: Send + Sync {
    async fn get(&self, id: &ChallengeId) -> Option<Arc<Challenge>>;

    async fn list(&self) -> Vec<Arc<Challenge>>;
}

/// Catalog held in memory, loaded from a JSON array of challenges.
#[derive(Default)]
pub struct InMemoryCatalog {
    challenges: BTreeMap<ChallengeId, Arc<Challenge>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and index `challenges`.
    pub fn from_challenges(challenges: Vec<Challenge>) -> Result<Self, CatalogLoadError> {
        let mut indexed = BTreeMap::new();
        for challenge in challenges {
            challenge.validate()?;
            let id = challenge.id.clone();
            if indexed.insert(id.clone(), Arc::new(challenge)).is_some() {
                return Err(CatalogLoadError::DuplicateChallenge(id));
            }
        }
        Ok(Self {
            challenges: indexed,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogLoadError> {
        let challenges: Vec<Challenge> = serde_json::from_str(json)?;
        Self::from_challenges(challenges)
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogLoadError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            challenges = catalog.len(),
            "Challenge catalog loaded"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

#[async_trait]
impl ChallengeCatalog for InMemoryCatalog {
    async fn get(&self, id: &ChallengeId) -> Option<Arc<Challenge>> {
        self.challenges.get(id).cloned()
    }

    async fn list(&self) -> Vec<Arc<Challenge>> {
        self.challenges.values().cloned().collect()
    }
}
