//! In-process counter store. Each counter sits behind its own async mutex
//! whose owned guard is held by the transaction, which gives the same
//! blocking behaviour as a row lock. Only valid within a single process.
//!
//! A row slot holds `None` until a transaction that created it commits, so
//! a rolled back upsert leaves no counter behind.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::{counter_key, CounterStore, CounterTransaction};
use crate::error::TransactionError;

type Row = Arc<RowLock<Option<u64>>>;
type Rows = Arc<Mutex<HashMap<String, Row>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    rows: Rows,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a counter outside any transaction, waiting for its lock.
    pub async fn seed(&self, category: &str, value: u64) {
        let Ok(key) = counter_key(category) else {
            return;
        };
        let row = slot(&self.rows, &key);
        *row.lock().await = Some(value);
    }

    /// Last committed value, or `None` if the counter was never created.
    pub async fn current(&self, category: &str) -> Option<u64> {
        let key = counter_key(category).ok()?;
        let row = lock_rows(&self.rows).get(&key).cloned()?;
        let value = *row.lock().await;
        value
    }
}

// The map is only mutated by single inserts, so a poisoned lock still holds
// consistent data.
fn lock_rows(rows: &Rows) -> MutexGuard<'_, HashMap<String, Row>> {
    rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn slot(rows: &Rows, key: &str) -> Row {
    let mut rows = lock_rows(rows);
    Arc::clone(
        rows.entry(key.to_string())
            .or_insert_with(|| Arc::new(RowLock::new(None))),
    )
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>, TransactionError> {
        Ok(Box::new(MemoryTransaction {
            rows: Arc::clone(&self.rows),
            locked: HashMap::new(),
        }))
    }
}

struct LockedRow {
    guard: OwnedMutexGuard<Option<u64>>,
    staged: Option<u64>,
}

impl LockedRow {
    fn value(&self) -> Option<u64> {
        self.staged.or(*self.guard)
    }
}

struct MemoryTransaction {
    rows: Rows,
    locked: HashMap<String, LockedRow>,
}

impl MemoryTransaction {
    async fn acquire(&mut self, key: &str, row: Row) -> &mut LockedRow {
        match self.locked.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let guard = row.lock_owned().await;
                entry.insert(LockedRow { guard, staged: None })
            }
        }
    }
}

#[async_trait]
impl CounterTransaction for MemoryTransaction {
    // Like an InnoDB upsert, this takes the row lock at once.
    async fn ensure_counter(&mut self, key: &str) -> Result<(), TransactionError> {
        let row = slot(&self.rows, key);
        let locked = self.acquire(key, row).await;
        if locked.value().is_none() {
            locked.staged = Some(0);
        }
        Ok(())
    }

    async fn lock_counter(&mut self, key: &str) -> Result<u64, TransactionError> {
        let missing = || TransactionError::Database(format!("no counter row for {key}"));
        if let Some(row) = self.locked.get(key) {
            return row.value().ok_or_else(missing);
        }

        let row = lock_rows(&self.rows).get(key).cloned().ok_or_else(missing)?;
        let value = self.acquire(key, row).await.value();
        match value {
            Some(value) => Ok(value),
            None => {
                self.locked.remove(key);
                Err(missing())
            }
        }
    }

    async fn store_counter(&mut self, key: &str, value: u64) -> Result<(), TransactionError> {
        let row = self
            .locked
            .get_mut(key)
            .ok_or_else(|| TransactionError::Database(format!("counter {key} is not locked")))?;
        row.staged = Some(value);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        for (_, mut row) in self.locked {
            if let Some(value) = row.staged {
                *row.guard = Some(value);
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        drop(self);
        Ok(())
    }
}
