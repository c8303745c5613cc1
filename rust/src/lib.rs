//! Rust rewrite of the preschool backend's data-protection core: invoice
//! number allocation, field-level encryption of personal data and password
//! hashing. Route handlers depend on the traits exported here and receive
//! concrete implementations built from a `RuntimeConfig`.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod sequence;
pub mod telemetry;

pub use codec::{EntityType, FieldCodec, FieldOutcome, Record};
pub use config::{load_config, EncryptionKey, RuntimeConfig};
pub use crypto::{AesGcmFieldCipher, CredentialHash, CredentialHasher, FieldCipher, Pbkdf2Hasher};
pub use error::{FieldCipherError, TransactionError};
pub use sequence::{
    InvoiceNumber, MemoryCounterStore, MySqlCounterStore, SequenceAllocator, TransactionalAllocator,
};
