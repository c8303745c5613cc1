//! Cryptography for personal data and credentials. Field encryption, password
//! hashing and token generation live in separate submodules so a caller can
//! depend on one without touching key material it does not need.

pub mod passwords;
pub mod pii;
pub mod tokens;

pub use passwords::{CredentialHash, CredentialHasher, Pbkdf2Hasher};
pub use pii::{is_encrypted, AesGcmFieldCipher, EncryptedField, FieldCipher};
pub use tokens::generate_secure_token;
