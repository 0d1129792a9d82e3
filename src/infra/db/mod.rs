//! Postgres-backed repository implementations.

mod collections;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, Transaction,
    postgres::{PgPool, PgPoolOptions},
};
use tokio::sync::{Mutex, MutexGuard};

use crate::application::repos::RepoError;

type PendingTransaction = Option<Transaction<'static, Postgres>>;

/// Postgres repositories sharing one pool.
///
/// Writes are collected in a single lazily-opened transaction that is
/// committed by `flush`; reads issued while it is open run inside it.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    pending: Arc<Mutex<PendingTransaction>>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    async fn pending(&self) -> MutexGuard<'_, PendingTransaction> {
        self.pending.lock().await
    }

    /// Open the shared write transaction unless one is already running.
    async fn ensure_transaction(&self, pending: &mut PendingTransaction) -> Result<(), RepoError> {
        if pending.is_none() {
            let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            *pending = Some(tx);
        }
        Ok(())
    }
}
