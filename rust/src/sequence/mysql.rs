//! MySQL-backed counters in the `expense_sequences` table.
//!
//! Each `begin` checks a connection out of the pool into an sqlx
//! `Transaction`. The transaction owns that connection, so it goes back to the
//! pool on commit, on rollback, and when the transaction is dropped on an
//! error path (sqlx rolls back on drop).

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, Transaction};
use tracing::info;

use super::{CounterStore, CounterTransaction};
use crate::config::DatabaseSettings;
use crate::error::TransactionError;

pub const SEQUENCE_TABLE: &str = "expense_sequences";

const CREATE_SEQUENCE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS expense_sequences (
      type VARCHAR(50) PRIMARY KEY,
      last_seq BIGINT NOT NULL DEFAULT 0,
      updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
"#;

// Leaves an existing row untouched; only a missing row is created at zero.
const ENSURE_COUNTER: &str =
    "INSERT INTO expense_sequences (type, last_seq) VALUES (?, 0) ON DUPLICATE KEY UPDATE last_seq = last_seq";

// The cast keeps older tables that declared `last_seq INT` readable as i64.
const LOCK_COUNTER: &str =
    "SELECT CAST(last_seq AS SIGNED) FROM expense_sequences WHERE type = ? FOR UPDATE";

const STORE_COUNTER: &str = "UPDATE expense_sequences SET last_seq = ? WHERE type = ?";

/// Counter store over a pooled MySQL connection provider.
#[derive(Debug, Clone)]
pub struct MySqlCounterStore {
    pool: MySqlPool,
}

impl MySqlCounterStore {
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Opens a pool with the configured limits. Connections are established
    /// lazily on first use.
    pub fn connect_lazy(settings: &DatabaseSettings) -> Result<Self, TransactionError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_lazy(&settings.url)?;
        Ok(Self { pool })
    }

    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, TransactionError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(&settings.url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Creates the sequence table if it is missing.
    pub async fn ensure_schema(&self) -> Result<(), TransactionError> {
        sqlx::query(CREATE_SEQUENCE_TABLE).execute(&self.pool).await?;
        info!(table = SEQUENCE_TABLE, "sequence table ready");
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MySqlCounterStore {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>, TransactionError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlCounterTransaction { tx }))
    }
}

struct MySqlCounterTransaction {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl CounterTransaction for MySqlCounterTransaction {
    async fn ensure_counter(&mut self, key: &str) -> Result<(), TransactionError> {
        sqlx::query(ENSURE_COUNTER)
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_counter(&mut self, key: &str) -> Result<u64, TransactionError> {
        let last: Option<i64> = sqlx::query_scalar(LOCK_COUNTER)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;
        let last = last.ok_or_else(|| TransactionError::Database(format!("no counter row for {key}")))?;
        u64::try_from(last)
            .map_err(|_| TransactionError::Database(format!("counter {key} is negative ({last})")))
    }

    async fn store_counter(&mut self, key: &str, value: u64) -> Result<(), TransactionError> {
        let value = i64::try_from(value)
            .map_err(|_| TransactionError::CounterExhausted(key.to_string()))?;
        let result = sqlx::query(STORE_COUNTER)
            .bind(value)
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() != 1 {
            return Err(TransactionError::Database(format!(
                "counter {key} update touched {} rows",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
