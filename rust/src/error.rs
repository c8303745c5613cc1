//! Error types shared by the cipher, codec and sequence modules.
//!
//! Cipher errors never carry plaintext or key material. Transaction errors
//! keep the driver message so operators can tell an outage from a lock
//! timeout, but nothing about the allocation is ever partially applied.

use thiserror::Error;

/// Failures while encrypting or decrypting a single field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldCipherError {
    /// The stored value is not a well-formed `iv:tag:ciphertext` envelope.
    #[error("malformed encrypted field: {0}")]
    Format(String),
    /// Authentication tag mismatch: tampered data, corruption or a wrong key.
    #[error("encrypted field failed integrity verification")]
    Integrity,
    #[error("encryption failed: {0}")]
    Encryption(String),
}

impl FieldCipherError {
    /// Short stable label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldCipherError::Format(_) => "format",
            FieldCipherError::Integrity => "integrity",
            FieldCipherError::Encryption(_) => "encryption",
        }
    }
}

/// Failures while allocating a sequence number. The enclosing transaction
/// has always been rolled back by the time one of these reaches a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("invalid sequence category: {0:?}")]
    InvalidCategory(String),
    #[error("database unavailable: {0}")]
    Unavailable(String),
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("sequence counter exhausted for {0}")]
    CounterExhausted(String),
}

impl TransactionError {
    /// True for faults where repeating the whole business operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransactionError::Unavailable(_) | TransactionError::LockTimeout(_)
        )
    }
}

// MySQL server error numbers that mean "another transaction holds the row".
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

impl TransactionError {
    /// Maps a server-side error by its MySQL error number, when there is one.
    pub fn from_server_error(number: Option<u16>, message: &str) -> Self {
        match number {
            Some(ER_LOCK_WAIT_TIMEOUT) | Some(ER_LOCK_DEADLOCK) => {
                TransactionError::LockTimeout(message.to_string())
            }
            _ => TransactionError::Database(message.to_string()),
        }
    }
}

impl From<sqlx::Error> for TransactionError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let number = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number());
                TransactionError::from_server_error(number, db_err.message())
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => TransactionError::Unavailable(format!("{err}")),
            other => TransactionError::Database(format!("{other}")),
        }
    }
}
