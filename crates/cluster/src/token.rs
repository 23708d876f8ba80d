//! One-time join tokens.
//!
//! A token is 32 random bytes plus the coordinator address and an expiry,
//! handed to the operator as base64(JSON). The store keeps only a SHA-256
//! hash of the secret; consumption is a single atomic conditional update, so
//! concurrent joins with the same token admit at most one node.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use pingmesh_model::JoinToken;
use pingmesh_store::Store;

use crate::{Error, Result};

/// Length of the random token secret in bytes.
pub const TOKEN_SECRET_LEN: usize = 32;

/// SHA-256 of a token secret, base64-encoded. Only this form is persisted.
pub fn hash_secret(secret: &[u8]) -> String {
    BASE64.encode(Sha256::digest(secret))
}

/// Mint a fresh single-use token and record its hash.
///
/// Returns the opaque operator-facing envelope.
pub fn mint_join_token(
    store: &dyn Store,
    coordinator_addr: &str,
    ttl: Duration,
) -> Result<String> {
    let mut secret = vec![0u8; TOKEN_SECRET_LEN];
    rand::rng().fill(secret.as_mut_slice());

    let token = JoinToken {
        addr: coordinator_addr.to_string(),
        secret,
        expires_at: Utc::now() + ttl,
    };

    store.store_join_token(&hash_secret(&token.secret), token.expires_at.timestamp_millis())?;

    let json = serde_json::to_vec(&token).map_err(|e| Error::Token(e.to_string()))?;
    Ok(BASE64.encode(json))
}

/// Decode an operator-supplied token envelope.
pub fn decode_token(envelope: &str) -> Result<JoinToken> {
    let json = BASE64
        .decode(envelope.trim())
        .map_err(|e| Error::Token(format!("base64: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| Error::Token(format!("json: {e}")))
}

/// Atomically consume the token for `secret`. `Ok(true)` for exactly one
/// caller per token; expired or already-used tokens yield `Ok(false)`.
pub fn consume_token(store: &dyn Store, secret: &[u8]) -> Result<bool> {
    Ok(store.validate_and_consume_token(&hash_secret(secret))?)
}
