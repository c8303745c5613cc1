//! Password hashing helpers built around PBKDF2-HMAC-SHA-512.
//! Stored credentials are `salt_hex:derived_hex` so they stay readable by the
//! accounts already in the users table.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::config::CredentialParams;

/// One-way credential hashing. Verification never errors: a malformed stored
/// value simply does not verify.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> CredentialHash;

    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// A salted PBKDF2 output as persisted in the database.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHash {
    salt_hex: String,
    derived_hex: String,
}

impl CredentialHash {
    pub fn salt_hex(&self) -> &str {
        &self.salt_hex
    }

    pub fn derived_hex(&self) -> &str {
        &self.derived_hex
    }
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.salt_hex, self.derived_hex)
    }
}

impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHash")
            .field("salt_hex", &self.salt_hex)
            .field("derived_hex", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCredential;

impl fmt::Display for MalformedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stored credential is not salt:hash hex")
    }
}

impl std::error::Error for MalformedCredential {}

impl FromStr for CredentialHash {
    type Err = MalformedCredential;

    fn from_str(stored: &str) -> Result<Self, Self::Err> {
        let (salt_hex, derived_hex) = stored.split_once(':').ok_or(MalformedCredential)?;
        let is_hex = |s: &str| !s.is_empty() && hex::decode(s).is_ok();
        if derived_hex.contains(':') || !is_hex(salt_hex) || !is_hex(derived_hex) {
            return Err(MalformedCredential);
        }
        Ok(Self {
            salt_hex: salt_hex.to_string(),
            derived_hex: derived_hex.to_ascii_lowercase(),
        })
    }
}

/// PBKDF2-HMAC-SHA-512 hasher with a fixed iteration count.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    params: CredentialParams,
}

impl Pbkdf2Hasher {
    pub fn new(params: CredentialParams) -> Self {
        Self { params }
    }

    // The salt enters PBKDF2 as its hex text, which is how every existing
    // hash in the users table was produced.
    fn derive(&self, password: &str, salt_hex: &str) -> Vec<u8> {
        let mut derived = vec![0u8; self.params.derived_key_length];
        pbkdf2::pbkdf2_hmac::<Sha512>(
            password.as_bytes(),
            salt_hex.as_bytes(),
            self.params.iterations,
            &mut derived,
        );
        derived
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new(CredentialParams::default())
    }
}

impl CredentialHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> CredentialHash {
        let mut salt = vec![0u8; self.params.salt_length];
        OsRng.fill_bytes(&mut salt);
        let salt_hex = hex::encode(salt);
        let derived_hex = hex::encode(self.derive(password, &salt_hex));
        CredentialHash { salt_hex, derived_hex }
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let parsed = match CredentialHash::from_str(stored) {
            Ok(hash) => hash,
            Err(_) => return false,
        };
        let expected = match hex::decode(&parsed.derived_hex) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        if expected.len() != self.params.derived_key_length {
            return false;
        }

        let actual = self.derive(password, &parsed.salt_hex);
        actual.ct_eq(&expected).into()
    }
}
