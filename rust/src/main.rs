//! Operator CLI for the preschool core. Each command maps onto one library
//! operation so key handling and number allocation can be checked by hand.

use std::env;
use std::process::ExitCode;

use preschool_rs::codec::{EntityType, FieldCodec, Record};
use preschool_rs::config::{load_config, RuntimeConfig};
use preschool_rs::crypto::tokens::{generate_secure_token, DEFAULT_TOKEN_BYTES};
use preschool_rs::crypto::{CredentialHasher, FieldCipher, Pbkdf2Hasher};
use preschool_rs::sequence::{MySqlCounterStore, SequenceAllocator, TransactionalAllocator};
use preschool_rs::telemetry::init_tracing;

fn print_usage() -> ExitCode {
    eprintln!("Commands:\n  hash-password [config] <plaintext>\n  verify-password [config] <plaintext> <salt:hash>\n  encrypt-field <config> <plaintext>\n  decrypt-field <config> <iv:tag:ciphertext>\n  encrypt-record <config> <entity> <json-object>\n  decrypt-record <config> <entity> <json-object>\n  generate-token [bytes]\n  init-schema <config>\n  allocate <config> <category>");
    ExitCode::from(2)
}

fn fail(context: &str, err: impl std::fmt::Display) -> ExitCode {
    eprintln!("{context}: {err}");
    ExitCode::FAILURE
}

fn setup(path: &str) -> Result<RuntimeConfig, ExitCode> {
    let config = load_config(path).map_err(|e| fail("config load failed", e))?;
    init_tracing(config.debug_level.as_deref());
    Ok(config)
}

// Without a config file the stored-credential defaults apply.
fn credential_hasher(config_path: Option<&str>) -> Result<Pbkdf2Hasher, ExitCode> {
    match config_path {
        Some(path) => setup(path).map(|config| config.credential_hasher()),
        None => {
            init_tracing(None);
            Ok(Pbkdf2Hasher::default())
        }
    }
}

fn parse_record(entity: &str, json: &str) -> Result<(EntityType, Record), ExitCode> {
    let entity: EntityType = entity.parse().map_err(|e| fail("invalid entity", e))?;
    let record: Record = serde_json::from_str(json).map_err(|e| fail("invalid record json", e))?;
    Ok((entity, record))
}

fn print_json(record: &Record) -> ExitCode {
    match serde_json::to_string_pretty(record) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => fail("serialization failed", err),
    }
}

async fn connect_store(config: &RuntimeConfig) -> Result<MySqlCounterStore, ExitCode> {
    let settings = config.database().map_err(|e| fail("database settings", e))?;
    MySqlCounterStore::connect(settings)
        .await
        .map_err(|e| fail("database connect failed", e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return print_usage();
    }

    let result = match (args[1].as_str(), args.len()) {
        ("hash-password", 3) | ("hash-password", 4) => {
            let (config_path, plaintext) = match args.len() {
                4 => (Some(args[2].as_str()), &args[3]),
                _ => (None, &args[2]),
            };
            credential_hasher(config_path).map(|hasher| {
                println!("{}", hasher.hash(plaintext));
                ExitCode::SUCCESS
            })
        }
        ("verify-password", 4) | ("verify-password", 5) => {
            let (config_path, plaintext, stored) = match args.len() {
                5 => (Some(args[2].as_str()), &args[3], &args[4]),
                _ => (None, &args[2], &args[3]),
            };
            credential_hasher(config_path).map(|hasher| {
                let matches = hasher.verify(plaintext, stored);
                println!("{}", if matches { "match" } else { "no-match" });
                if matches {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            })
        }
        ("generate-token", 2) | ("generate-token", 3) => {
            init_tracing(None);
            match args.get(2).map(|n| n.parse::<usize>()).transpose() {
                Ok(len) => {
                    println!("{}", generate_secure_token(len.unwrap_or(DEFAULT_TOKEN_BYTES)));
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => Err(fail("invalid token length", err)),
            }
        }
        ("encrypt-field", 4) => setup(&args[2]).map(|config| {
            match config.field_cipher().encrypt_str(&args[3]) {
                Ok(sealed) => {
                    println!("{sealed}");
                    ExitCode::SUCCESS
                }
                Err(err) => fail("encryption failed", err),
            }
        }),
        ("decrypt-field", 4) => setup(&args[2]).map(|config| {
            match config.field_cipher().decrypt_str(&args[3]) {
                Ok(plaintext) => {
                    println!("{plaintext}");
                    ExitCode::SUCCESS
                }
                Err(err) => fail("decryption failed", err),
            }
        }),
        ("encrypt-record", 5) => setup(&args[2]).and_then(|config| {
            let (entity, record) = parse_record(&args[3], &args[4])?;
            let codec = FieldCodec::new(config.field_cipher());
            match codec.encrypt_fields(&record, entity) {
                Ok(sealed) => Ok(print_json(&sealed)),
                Err(err) => Err(fail("encryption failed", err)),
            }
        }),
        ("decrypt-record", 5) => setup(&args[2]).and_then(|config| {
            let (entity, record) = parse_record(&args[3], &args[4])?;
            let codec = FieldCodec::new(config.field_cipher());
            Ok(print_json(&codec.decrypt_fields(&record, entity)))
        }),
        ("init-schema", 3) => match setup(&args[2]) {
            Ok(config) => match connect_store(&config).await {
                Ok(store) => match store.ensure_schema().await {
                    Ok(()) => Ok(ExitCode::SUCCESS),
                    Err(err) => Err(fail("schema setup failed", err)),
                },
                Err(code) => Err(code),
            },
            Err(code) => Err(code),
        },
        ("allocate", 4) => match setup(&args[2]) {
            Ok(config) => match connect_store(&config).await {
                Ok(store) => {
                    let allocator = TransactionalAllocator::new(store);
                    match allocator.allocate_now(&args[3]).await {
                        Ok(number) => {
                            println!("{number}");
                            Ok(ExitCode::SUCCESS)
                        }
                        Err(err) => Err(fail("allocation failed", err)),
                    }
                }
                Err(code) => Err(code),
            },
            Err(code) => Err(code),
        },
        _ => Err(print_usage()),
    };

    result.unwrap_or_else(|code| code)
}
