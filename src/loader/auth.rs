//! Authorization tokens for remote session loads.
//!
//! The backend signs each grant so the loader can check it offline:
//!
//! ```text
//!   userId | machineId | tokens | timestamp | hex(HMAC-SHA256(secret, "userId|machineId|tokens|timestamp"))
//! ```
//!
//! Crypto is handled by the `hmac-sha256` crate; the signature check is
//! constant-time.

use log::warn;

use crate::clock::{Tick, elapsed_since};
use crate::error::LoadError;

/// A token must be presented within this long of its receipt (ms).
pub const MAX_TOKEN_AGE_MS: u32 = 300_000;

/// Plausible signing time: 2020-01-01 .. 2100-01-01 (Unix seconds).
pub const TIMESTAMP_RANGE: core::ops::RangeInclusive<u64> = 1_577_836_800..=4_102_444_800;

/// What a token is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub user_id: &'a str,
    pub machine_id: &'a str,
    pub tokens: u32,
}

/// Validate `token` for the expected grant.
///
/// `received_at` is the tick the token arrived; age is measured on the
/// loader's own clock, not the signed timestamp.
pub fn validate_token(
    token: &str,
    expected: Expected<'_>,
    received_at: Tick,
    now: Tick,
    secret: &[u8],
) -> Result<(), LoadError> {
    if token.matches('|').count() != 4 {
        warn!("auth: token has {} separators, expected 4", token.matches('|').count());
        return Err(LoadError::TokenFormat);
    }
    let Some((payload, signature)) = token.rsplit_once('|') else {
        return Err(LoadError::TokenFormat);
    };
    let mut fields = payload.split('|');
    let (Some(user_id), Some(machine_id), Some(tokens), Some(timestamp)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(LoadError::TokenFormat);
    };

    if user_id != expected.user_id {
        warn!("auth: user id mismatch");
        return Err(LoadError::TokenMismatch("user_id"));
    }
    if machine_id != expected.machine_id {
        warn!("auth: machine id mismatch (token for {machine_id})");
        return Err(LoadError::TokenMismatch("machine_id"));
    }
    if tokens.parse::<u32>().ok() != Some(expected.tokens) {
        warn!("auth: token count mismatch ({tokens} vs {})", expected.tokens);
        return Err(LoadError::TokenMismatch("tokens"));
    }

    let age = elapsed_since(now, received_at);
    if age > MAX_TOKEN_AGE_MS {
        warn!("auth: token received {} s ago", age / 1000);
        return Err(LoadError::TokenExpired);
    }

    match timestamp.parse::<u64>() {
        Ok(ts) if TIMESTAMP_RANGE.contains(&ts) => {}
        _ => {
            warn!("auth: timestamp {timestamp:?} out of range");
            return Err(LoadError::TimestampOutOfRange);
        }
    }

    let Some(tag) = decode_hex_lower(signature) else {
        warn!("auth: signature is not 64 lowercase hex digits");
        return Err(LoadError::SignatureMismatch);
    };
    if !hmac_sha256::HMAC::verify(payload.as_bytes(), secret, &tag) {
        warn!("auth: signature mismatch");
        return Err(LoadError::SignatureMismatch);
    }
    Ok(())
}

/// Build a signed token. Counterpart of [`validate_token`], used by
/// provisioning tools and tests.
pub fn sign_token(user_id: &str, machine_id: &str, tokens: u32, timestamp: u64, secret: &[u8]) -> String {
    let payload = format!("{user_id}|{machine_id}|{tokens}|{timestamp}");
    let tag = hmac_sha256::HMAC::mac(payload.as_bytes(), secret);
    let mut out = payload;
    out.push('|');
    for b in tag {
        out.push(HEX[usize::from(b >> 4)] as char);
        out.push(HEX[usize::from(b & 0x0F)] as char);
    }
    out
}

const HEX: &[u8; 16] = b"0123456789abcdef";

fn decode_hex_lower(s: &str) -> Option<[u8; 32]> {
    let bytes = s.as_bytes();
    if bytes.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (dst, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *dst = (nibble(pair[0])? << 4) | nibble(pair[1])?;
    }
    Some(out)
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}
