//! Field-level authenticated encryption for personal data built on AES-256-GCM.
//! Each stored value is `iv:tag:ciphertext`, hex encoded, so it fits in the
//! existing text columns of parent, child, user and enquiry rows.

use std::fmt;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::EncryptionKey;
use crate::error::FieldCipherError;

/// AES-256-GCM keyed with a 128-bit nonce, matching the stored IV width.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const IV_SIZE: usize = 16;
pub const TAG_SIZE: usize = 16;

/// Bound into every tag; changing it invalidates all stored fields.
const ASSOCIATED_DATA: &[u8] = b"additional-auth-data";

/// Symmetric encryption of individual optional string fields.
///
/// `None` and `Some("")` pass through both directions unchanged so nullable
/// columns can be fed in without special casing.
pub trait FieldCipher: Send + Sync {
    fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<String>, FieldCipherError>;

    fn decrypt(&self, payload: Option<&str>) -> Result<Option<String>, FieldCipherError>;

    fn encrypt_str(&self, plaintext: &str) -> Result<String, FieldCipherError> {
        Ok(self.encrypt(Some(plaintext))?.unwrap_or_default())
    }

    fn decrypt_str(&self, payload: &str) -> Result<String, FieldCipherError> {
        Ok(self.decrypt(Some(payload))?.unwrap_or_default())
    }
}

/// Parsed representation of a stored `ivHex:tagHex:cipherHex` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    pub iv: [u8; IV_SIZE],
    pub tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// Splits and hex-decodes a stored value. Only the structure is checked;
    /// authenticity is established by decrypting.
    pub fn parse(payload: &str) -> Result<Self, FieldCipherError> {
        let parts: Vec<&str> = payload.split(':').collect();
        if parts.len() != 3 {
            return Err(FieldCipherError::Format(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }

        let iv = decode_fixed::<IV_SIZE>(parts[0], "iv")?;
        let tag = decode_fixed::<TAG_SIZE>(parts[1], "auth tag")?;
        let ciphertext = hex::decode(parts[2])
            .map_err(|e| FieldCipherError::Format(format!("ciphertext: {e}")))?;

        Ok(Self { iv, tag, ciphertext })
    }
}

impl fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            hex::encode(self.iv),
            hex::encode(self.tag),
            hex::encode(&self.ciphertext)
        )
    }
}

fn decode_fixed<const N: usize>(segment: &str, label: &str) -> Result<[u8; N], FieldCipherError> {
    let bytes =
        hex::decode(segment).map_err(|e| FieldCipherError::Format(format!("{label}: {e}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        FieldCipherError::Format(format!("{label}: expected {N} bytes, found {}", bytes.len()))
    })
}

/// Returns true when `value` has the shape of an encrypted field.
pub fn is_encrypted(value: &str) -> bool {
    EncryptedField::parse(value).is_ok()
}

/// AES-256-GCM field cipher keyed once for the life of the process.
pub struct AesGcmFieldCipher {
    cipher: Aes256Gcm16,
}

impl AesGcmFieldCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            cipher: Aes256Gcm16::new(Key::<Aes256Gcm16>::from_slice(key.as_bytes())),
        }
    }

    fn seal(&self, plaintext: &str) -> Result<EncryptedField, FieldCipherError> {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let mut ciphertext = self
            .cipher
            .encrypt(
                Nonce::<U16>::from_slice(&iv),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|e| FieldCipherError::Encryption(format!("{e}")))?;

        // aes-gcm appends the tag; the stored layout keeps it as its own segment.
        if ciphertext.len() < TAG_SIZE {
            return Err(FieldCipherError::Encryption(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }
        let tag_bytes = ciphertext.split_off(ciphertext.len() - TAG_SIZE);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&tag_bytes);

        Ok(EncryptedField { iv, tag, ciphertext })
    }

    fn open(&self, field: &EncryptedField) -> Result<String, FieldCipherError> {
        let mut combined = Vec::with_capacity(field.ciphertext.len() + TAG_SIZE);
        combined.extend_from_slice(&field.ciphertext);
        combined.extend_from_slice(&field.tag);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::<U16>::from_slice(&field.iv),
                Payload {
                    msg: &combined,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|_| FieldCipherError::Integrity)?;

        String::from_utf8(plaintext)
            .map_err(|_| FieldCipherError::Format("plaintext is not valid UTF-8".to_string()))
    }
}

impl FieldCipher for AesGcmFieldCipher {
    fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<String>, FieldCipherError> {
        match plaintext {
            None => Ok(None),
            Some("") => Ok(Some(String::new())),
            Some(text) => Ok(Some(self.seal(text)?.to_string())),
        }
    }

    fn decrypt(&self, payload: Option<&str>) -> Result<Option<String>, FieldCipherError> {
        match payload {
            None => Ok(None),
            Some("") => Ok(Some(String::new())),
            Some(text) => {
                let field = EncryptedField::parse(text)?;
                Ok(Some(self.open(&field)?))
            }
        }
    }
}
