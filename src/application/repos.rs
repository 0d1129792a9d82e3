//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::collections::{CollectionDraft, CollectionKey, CollectionRecord, Locale, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Collection store used by the system collection manager.
///
/// Writes may be staged; they become durable once `flush` returns and are
/// thrown away by `discard`.
#[async_trait]
pub trait CollectionsRepo: Send + Sync {
    /// Look up a collection by key, projected onto `locale`.
    async fn find_by_key(
        &self,
        key: &CollectionKey,
        locale: &Locale,
    ) -> Result<Option<CollectionRecord>, RepoError>;

    /// Create the collection when `draft.id` is absent, otherwise update the
    /// `draft.locale` projection of the identified collection.
    async fn save(
        &self,
        draft: CollectionDraft,
        actor: Option<UserId>,
    ) -> Result<CollectionRecord, RepoError>;

    /// Commit all pending writes.
    async fn flush(&self) -> Result<(), RepoError>;

    /// Drop pending writes without committing them.
    async fn discard(&self) -> Result<(), RepoError>;
}
