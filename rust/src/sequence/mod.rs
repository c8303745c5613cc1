//! Invoice number allocation.
//!
//! Numbers come from one counter row per category. The database row lock is
//! the only serialization point, so any number of server processes can share
//! one database: same-category allocations queue on the lock, different
//! categories never contend.
//!
//! Allocation commits on its own. A caller that crashes between `allocate`
//! and its own insert burns that number; nothing here tries to reclaim it.

mod memory;
mod mysql;

pub use memory::MemoryCounterStore;
pub use mysql::{MySqlCounterStore, SEQUENCE_TABLE};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::TransactionError;

/// Minimum width of the zero-padded sequence part.
pub const SEQUENCE_WIDTH: usize = 5;

/// A formatted, allocated invoice number such as `ONLINE-202405-00001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvoiceNumber {
    category: String,
    period: String,
    sequence: u64,
}

impl InvoiceNumber {
    pub fn new(category: &str, now: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            category: category.trim().to_uppercase(),
            period: now.format("%Y%m").to_string(),
            sequence,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:0width$}",
            self.category,
            self.period,
            self.sequence,
            width = SEQUENCE_WIDTH
        )
    }
}

/// Counter rows are keyed case-insensitively.
pub fn counter_key(category: &str) -> Result<String, TransactionError> {
    let trimmed = category.trim();
    if trimmed.is_empty() {
        return Err(TransactionError::InvalidCategory(category.to_string()));
    }
    Ok(trimmed.to_lowercase())
}

/// Allocates unique, gapless invoice numbers per category.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// `now` supplies the `YYYYMM` period label.
    async fn allocate(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<InvoiceNumber, TransactionError>;

    async fn allocate_now(&self, category: &str) -> Result<InvoiceNumber, TransactionError> {
        self.allocate(category, Utc::now()).await
    }
}

/// Storage that can open a transaction over the counter rows.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>, TransactionError>;
}

/// One open transaction. Dropping it without `commit` discards its writes
/// and releases its locks.
#[async_trait]
pub trait CounterTransaction: Send {
    /// Creates the counter at zero if it does not exist; never resets it.
    async fn ensure_counter(&mut self, key: &str) -> Result<(), TransactionError>;

    /// Reads the counter under an exclusive row lock held until the
    /// transaction ends.
    async fn lock_counter(&mut self, key: &str) -> Result<u64, TransactionError>;

    async fn store_counter(&mut self, key: &str, value: u64) -> Result<(), TransactionError>;

    async fn commit(self: Box<Self>) -> Result<(), TransactionError>;

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError>;
}

/// Upsert, lock, increment, commit. Any failure rolls the whole
/// transaction back and is returned unchanged; there is no retry.
pub struct TransactionalAllocator<S> {
    store: S,
}

impl<S: CounterStore> TransactionalAllocator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn advance(tx: &mut dyn CounterTransaction, key: &str) -> Result<u64, TransactionError> {
        tx.ensure_counter(key).await?;
        let last = tx.lock_counter(key).await?;
        let next = last
            .checked_add(1)
            .ok_or_else(|| TransactionError::CounterExhausted(key.to_string()))?;
        tx.store_counter(key, next).await?;
        Ok(next)
    }
}

#[async_trait]
impl<S: CounterStore> SequenceAllocator for TransactionalAllocator<S> {
    async fn allocate(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<InvoiceNumber, TransactionError> {
        let key = counter_key(category)?;
        let mut tx = self.store.begin().await?;

        match Self::advance(tx.as_mut(), &key).await {
            Ok(next) => {
                tx.commit().await?;
                let number = InvoiceNumber::new(&key, now, next);
                debug!(category = %key, sequence = next, "allocated invoice number");
                Ok(number)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(category = %key, error = %rollback_err, "rollback after failed allocation also failed");
                }
                Err(err)
            }
        }
    }
}
