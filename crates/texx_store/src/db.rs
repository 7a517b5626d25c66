//! Database abstraction over SQLite via sqlx.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use texx_crypto::KdfParams;
use tracing::debug;

use crate::{
    attempts::AttemptCounter, contacts::ContactKeyStore, error::StoreError,
    message_log::MessageLog, pending::DeadLetters, vault::IdentityVault,
};

pub const DB_FILE: &str = "texx.db";

/// Central store handle for one account.  Cheap to clone (pool is Arc internally).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
    pub vault: IdentityVault,
    pub contacts: ContactKeyStore,
    pub log: MessageLog,
    pub pending: DeadLetters,
    pub attempts: AttemptCounter,
    data_dir: PathBuf,
}

impl Store {
    /// Open (or create) the account rooted at `data_dir`.
    /// Runs all pending migrations automatically.
    ///
    /// WAL journal mode is set on the connection options, not in a
    /// migration: SQLite refuses to change `journal_mode` inside the
    /// transaction sqlx wraps each migration in.
    pub async fn open(data_dir: &Path, kdf: KdfParams) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let opts = SqliteConnectOptions::new()
            .filename(data_dir.join(DB_FILE))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        let log = MessageLog::load(pool.clone()).await?;
        debug!(dir = %data_dir.display(), "store opened");

        Ok(Self {
            vault: IdentityVault::new(data_dir, pool.clone(), kdf),
            contacts: ContactKeyStore::new(pool.clone()),
            log,
            pending: DeadLetters::new(pool.clone()),
            attempts: AttemptCounter::new(data_dir),
            data_dir: data_dir.to_path_buf(),
            pool,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reopen_runs_migrations_idempotently() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();
        store.close().await;
        let again = Store::open(dir.path(), KdfParams::minimal()).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&again.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
