use thiserror::Error;

use crate::config::LoadError;

/// Failures while bootstrapping the binary around the collection manager.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("configuration could not be loaded")]
    Configuration(#[from] LoadError),
    #[error("database {operation} failed")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
