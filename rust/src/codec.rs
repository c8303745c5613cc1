//! Record-level encryption of the personal fields of each entity type.
//!
//! Records are JSON objects as they come out of (or go into) the database
//! layer. Only the fields listed for the entity are touched, and only when
//! they hold a non-empty string.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::warn;

use crate::crypto::FieldCipher;
use crate::error::FieldCipherError;

pub type Record = Map<String, Value>;

/// Entity types that carry personal data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Parent,
    Child,
    User,
    Enquiry,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Parent,
        EntityType::Child,
        EntityType::User,
        EntityType::Enquiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Parent => "PARENT",
            EntityType::Child => "CHILD",
            EntityType::User => "USER",
            EntityType::Enquiry => "ENQUIRY",
        }
    }

    /// Sensitive fields in the order they are processed.
    pub fn sensitive_fields(&self) -> &'static [&'static str] {
        match self {
            EntityType::Parent => &["first_name", "last_name", "email", "phone_number", "address"],
            EntityType::Child => &["first_name", "last_name", "medical_info", "emergency_contact"],
            EntityType::User => &["first_name", "last_name", "email", "phone_number"],
            EntityType::Enquiry => &["parent_name", "mobile_number", "email", "child_name"],
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityType(pub String);

impl fmt::Display for UnknownEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown entity type {:?}", self.0)
    }
}

impl std::error::Error for UnknownEntityType {}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|entity| entity.as_str().eq_ignore_ascii_case(tag.trim()))
            .ok_or_else(|| UnknownEntityType(tag.to_string()))
    }
}

/// Decryption outcome for one listed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub field: &'static str,
    pub result: Result<String, FieldCipherError>,
}

/// Applies a `FieldCipher` to the sensitive fields of whole records.
pub struct FieldCodec<C> {
    cipher: C,
}

impl<C: FieldCipher> FieldCodec<C> {
    pub fn new(cipher: C) -> Self {
        Self { cipher }
    }

    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    /// Returns a copy of `record` with every present, non-empty sensitive
    /// string encrypted. Other keys are copied untouched.
    pub fn encrypt_fields(
        &self,
        record: &Record,
        entity: EntityType,
    ) -> Result<Record, FieldCipherError> {
        let mut out = record.clone();
        for field in entity.sensitive_fields() {
            if let Some(Value::String(text)) = out.get_mut(*field) {
                if text.is_empty() {
                    continue;
                }
                *text = self.cipher.encrypt_str(text)?;
            }
        }
        Ok(out)
    }

    /// Attempts every present, non-empty sensitive string without modifying
    /// the record, reporting each field's result.
    pub fn decrypt_fields_detailed(&self, record: &Record, entity: EntityType) -> Vec<FieldOutcome> {
        entity
            .sensitive_fields()
            .iter()
            .filter_map(|&field| match record.get(field) {
                Some(Value::String(text)) if !text.is_empty() => Some(FieldOutcome {
                    field,
                    result: self.cipher.decrypt_str(text),
                }),
                _ => None,
            })
            .collect()
    }

    /// Lenient decryption for reads: a field that fails to decrypt keeps its
    /// stored value so rows written before a column was encrypted remain
    /// readable. Each failure is logged without the value.
    pub fn decrypt_fields(&self, record: &Record, entity: EntityType) -> Record {
        let mut out = record.clone();
        for outcome in self.decrypt_fields_detailed(record, entity) {
            match outcome.result {
                Ok(plaintext) => {
                    out.insert(outcome.field.to_string(), Value::String(plaintext));
                }
                Err(err) => {
                    warn!(
                        entity = %entity,
                        field = outcome.field,
                        kind = err.kind(),
                        "failed to decrypt field; keeping stored value"
                    );
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityType, FieldCodec, Record};
    use crate::config::EncryptionKey;
    use crate::crypto::{is_encrypted, AesGcmFieldCipher, FieldCipher};
    use crate::error::FieldCipherError;
    use serde_json::{json, Value};

    fn codec() -> FieldCodec<AesGcmFieldCipher> {
        let key = EncryptionKey::from_bytes(&[21u8; 32]).expect("valid key");
        FieldCodec::new(AesGcmFieldCipher::new(&key))
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn parses_entity_tags_case_insensitively() {
        assert_eq!("parent".parse::<EntityType>().unwrap(), EntityType::Parent);
        assert_eq!(" Enquiry ".parse::<EntityType>().unwrap(), EntityType::Enquiry);
        assert!("staff".parse::<EntityType>().is_err());
        for entity in EntityType::ALL {
            assert_eq!(entity.to_string().parse::<EntityType>().unwrap(), entity);
        }
    }

    #[test]
    fn encrypts_listed_fields_and_leaves_others() {
        let codec = codec();
        let input = record(json!({ "first_name": "Jane", "unrelated": 42 }));

        let out = codec.encrypt_fields(&input, EntityType::Parent).expect("encrypt");
        let sealed = out["first_name"].as_str().expect("string");
        assert!(is_encrypted(sealed));
        assert_eq!(out["unrelated"], json!(42));
        assert!(!out.contains_key("last_name"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn skips_null_empty_and_non_string_values() {
        let codec = codec();
        let input = record(json!({
            "first_name": null,
            "last_name": "",
            "email": 7,
            "address": "1 Long Street"
        }));

        let out = codec.encrypt_fields(&input, EntityType::Parent).unwrap();
        assert_eq!(out["first_name"], Value::Null);
        assert_eq!(out["last_name"], json!(""));
        assert_eq!(out["email"], json!(7));
        assert!(is_encrypted(out["address"].as_str().unwrap()));
    }

    #[test]
    fn only_the_entity_field_list_is_used() {
        let codec = codec();
        let input = record(json!({ "email": "a@b.c", "medical_info": "asthma" }));

        let as_user = codec.encrypt_fields(&input, EntityType::User).unwrap();
        assert!(is_encrypted(as_user["email"].as_str().unwrap()));
        assert_eq!(as_user["medical_info"], json!("asthma"));

        let as_child = codec.encrypt_fields(&input, EntityType::Child).unwrap();
        assert_eq!(as_child["email"], json!("a@b.c"));
        assert!(is_encrypted(as_child["medical_info"].as_str().unwrap()));
    }

    #[test]
    fn decrypt_mirrors_encrypt() {
        let codec = codec();
        let input = record(json!({
            "parent_name": "Sam Lee",
            "mobile_number": "0400 000 000",
            "email": "sam@example.com",
            "child_name": "Alex",
            "status": "new"
        }));

        let sealed = codec.encrypt_fields(&input, EntityType::Enquiry).unwrap();
        assert_ne!(sealed, input);
        assert_eq!(codec.decrypt_fields(&sealed, EntityType::Enquiry), input);
    }

    #[test]
    fn keeps_stored_value_when_a_field_fails() {
        let codec = codec();
        let good = codec.cipher().encrypt_str("Jane").unwrap();
        let mut tampered = codec.cipher().encrypt_str("Doe").unwrap();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        let input = record(json!({
            "first_name": good,
            "last_name": tampered,
            "email": "legacy@plaintext.org"
        }));

        let out = codec.decrypt_fields(&input, EntityType::Parent);
        assert_eq!(out["first_name"], json!("Jane"));
        assert_eq!(out["last_name"], input["last_name"]);
        assert_eq!(out["email"], json!("legacy@plaintext.org"));
    }

    #[test]
    fn detailed_outcomes_report_each_field() {
        let codec = codec();
        let good = codec.cipher().encrypt_str("Jane").unwrap();
        let input = record(json!({
            "first_name": good,
            "last_name": "Plain",
            "phone_number": null
        }));

        let outcomes = codec.decrypt_fields_detailed(&input, EntityType::User);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].field, "first_name");
        assert_eq!(outcomes[0].result, Ok("Jane".to_string()));
        assert_eq!(outcomes[1].field, "last_name");
        assert!(matches!(outcomes[1].result, Err(FieldCipherError::Format(_))));
    }
}
