use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::debug;

use crate::domain::collections::SystemCollectionMap;

use super::{CacheError, FreshnessCache};

/// Layout version of the persisted document; older documents count as stale.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    generated_at: i64,
    collections: SystemCollectionMap,
}

#[derive(Debug, Deserialize)]
struct CacheHeader {
    version: u32,
}

/// Freshness cache persisted as a JSON document.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so readers never observe a half-written document.
#[derive(Debug, Clone)]
pub struct FileFreshnessCache {
    path: PathBuf,
}

impl FileFreshnessCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_bytes(&self) -> Result<Option<Vec<u8>>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CacheError::io(&self.path, err)),
        }
    }
}

#[async_trait]
impl FreshnessCache for FileFreshnessCache {
    async fn is_fresh(&self) -> Result<bool, CacheError> {
        let Some(bytes) = self.load_bytes().await? else {
            return Ok(false);
        };
        let header: CacheHeader =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Decode {
                path: self.path.clone(),
                source,
            })?;
        if header.version != CACHE_FORMAT_VERSION {
            debug!(
                target = "vellum::cache::file",
                path = %self.path.display(),
                found = header.version,
                expected = CACHE_FORMAT_VERSION,
                "Cache document version mismatch; treating as stale"
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn invalidate(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::io(&self.path, err)),
        }
    }

    async fn write(&self, map: &SystemCollectionMap) -> Result<(), CacheError> {
        let document = CacheDocument {
            version: CACHE_FORMAT_VERSION,
            generated_at: OffsetDateTime::now_utc().unix_timestamp(),
            collections: map.clone(),
        };
        let payload = serde_json::to_vec_pretty(&document).map_err(CacheError::Encode)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || persist_atomically(&path, &payload))
            .await
            .map_err(|err| CacheError::Worker(err.to_string()))?
    }

    async fn read(&self) -> Result<SystemCollectionMap, CacheError> {
        let bytes = self.load_bytes().await?.ok_or(CacheError::Missing)?;
        let document: CacheDocument =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Decode {
                path: self.path.clone(),
                source,
            })?;
        if document.version != CACHE_FORMAT_VERSION {
            return Err(CacheError::Version {
                path: self.path.clone(),
                found: document.version,
            });
        }
        Ok(document.collections)
    }
}

fn persist_atomically(path: &Path, payload: &[u8]) -> Result<(), CacheError> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory).map_err(|err| CacheError::io(&directory, err))?;

    let mut file = NamedTempFile::new_in(&directory).map_err(|err| CacheError::io(&directory, err))?;
    file.write_all(payload)
        .map_err(|err| CacheError::io(file.path(), err))?;
    file.flush().map_err(|err| CacheError::io(file.path(), err))?;
    file.persist(path)
        .map_err(|err| CacheError::io(path, err.error))?;
    Ok(())
}
