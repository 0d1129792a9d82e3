//! Freshness cache for the system collection map.
//!
//! The manager keeps its own process-local copy of the map; the cache here is
//! the persisted tier that decides whether a rebuild is needed at all.
//!
//! - [`MemoryFreshnessCache`]: lives as long as the process.
//! - [`FileFreshnessCache`]: a JSON document on disk, shared by every process
//!   pointing at the same path.

mod file;
pub(crate) mod lock;
mod memory;

use std::{io, path::PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::collections::SystemCollectionMap;

pub use file::{CACHE_FORMAT_VERSION, FileFreshnessCache};
pub use memory::MemoryFreshnessCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o failed for `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache document `{path}` is malformed: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode cache document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cache document `{path}` has unsupported version {found}")]
    Version { path: PathBuf, found: u32 },
    #[error("cache holds no system collection map")]
    Missing,
    #[error("cache worker failed: {0}")]
    Worker(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Persisted tier of the system collection map.
#[async_trait]
pub trait FreshnessCache: Send + Sync {
    /// Whether a previously written map is available.
    async fn is_fresh(&self) -> Result<bool, CacheError>;

    /// Drop the stored map so the next check reports stale.
    async fn invalidate(&self) -> Result<(), CacheError>;

    async fn write(&self, map: &SystemCollectionMap) -> Result<(), CacheError>;

    async fn read(&self) -> Result<SystemCollectionMap, CacheError>;
}
