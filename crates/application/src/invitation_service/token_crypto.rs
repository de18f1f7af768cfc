use std::fmt::Write;

use sha2::{Digest, Sha256};
use warden_core::{AppError, AppResult};

/// Generates a random invitation token and its storage hash.
///
/// Returns `(raw_token_hex, sha256_hash_hex)`. Only the hash is persisted.
pub(super) fn generate_invitation_token() -> AppResult<(String, String)> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|error| {
        AppError::Internal(format!("failed to generate invitation token: {error}"))
    })?;

    let raw_token = to_hex(&bytes);
    let token_hash = hash_invitation_token(&raw_token);
    Ok((raw_token, token_hash))
}

/// Hashes a presented token for lookup.
pub(super) fn hash_invitation_token(raw_token: &str) -> String {
    to_hex(&Sha256::digest(raw_token.trim().as_bytes()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}
