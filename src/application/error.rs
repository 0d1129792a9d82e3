use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{repos::RepoError, system_collections::SystemCollectionError},
    cache::CacheError,
    infra::error::InfraError,
};

/// Error chain flattened into printable lines, outermost first.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    SystemCollections(#[from] SystemCollectionError),
}

impl AppError {
    /// Process exit code reported by the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::SystemCollections(SystemCollectionError::Unrecognized { .. }) => 2,
            AppError::Infra(InfraError::Configuration(_)) => 78,
            AppError::Infra(InfraError::Database { .. })
            | AppError::SystemCollections(SystemCollectionError::Repo(_)) => 69,
            AppError::SystemCollections(SystemCollectionError::Cache(_)) => 74,
            AppError::Infra(InfraError::Telemetry(_)) => 1,
        }
    }
}

impl From<RepoError> for AppError {
    fn from(error: RepoError) -> Self {
        Self::SystemCollections(SystemCollectionError::Repo(error))
    }
}

impl From<CacheError> for AppError {
    fn from(error: CacheError) -> Self {
        Self::SystemCollections(SystemCollectionError::Cache(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadError;

    #[test]
    fn report_walks_the_source_chain() {
        let error = AppError::from(CacheError::io(
            "/tmp/cache.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        ));

        let report = ErrorReport::from_error("tests", &error);

        assert_eq!(report.messages.len(), 2);
        assert!(report.messages[0].contains("/tmp/cache.json"));
        assert_eq!(report.messages[1], "denied");
    }

    #[test]
    fn unknown_collection_maps_to_dedicated_exit_code() {
        let error = AppError::from(SystemCollectionError::Unrecognized {
            key: "missing".to_string(),
            valid_keys: vec!["root".to_string()],
        });
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn bootstrap_failures_keep_their_cause() {
        let error = AppError::from(InfraError::database("connect", sqlx::Error::PoolTimedOut));
        assert_eq!(error.exit_code(), 69);
        let report = ErrorReport::from_error("tests", &error);
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0], "database connect failed");

        let error = AppError::from(InfraError::from(LoadError::Invalid {
            key: "database.url",
            reason: "a connection URL is required".to_string(),
        }));
        assert_eq!(error.exit_code(), 78);
        let report = ErrorReport::from_error("tests", &error);
        assert_eq!(
            report.messages,
            [
                "configuration could not be loaded",
                "invalid configuration for `database.url`: a connection URL is required",
            ]
        );
    }
}
