//! Random tokens for password-reset links and session identifiers.

use rand::rngs::OsRng;
use rand::RngCore;

pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Returns `len` bytes from the OS RNG, hex encoded (so `2 * len` characters).
pub fn generate_secure_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
