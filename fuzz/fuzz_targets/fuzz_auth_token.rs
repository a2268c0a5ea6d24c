//! Fuzz target: `loader::auth::validate_token`
//!
//! Feeds arbitrary strings as authorization tokens, and arbitrary ticks
//! as receipt/check times, against a fixed expected grant.
//!
//! Invariants checked:
//! - No panics under any byte sequence (multi-byte UTF-8 included)
//! - A token is only accepted if it is byte-identical to the one
//!   `sign_token` produces for the expected grant
//!
//! cargo fuzz run fuzz_auth_token

#![no_main]

use fullwash::loader::auth::{Expected, sign_token, validate_token};
use libfuzzer_sys::fuzz_target;

const SECRET: &[u8] = b"fuzz-secret-0123456789abcdef";

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let (ticks, rest) = data.split_at(8);
    let received_at = u32::from_le_bytes([ticks[0], ticks[1], ticks[2], ticks[3]]);
    let now = u32::from_le_bytes([ticks[4], ticks[5], ticks[6], ticks[7]]);
    let Ok(token) = core::str::from_utf8(rest) else {
        return;
    };

    let expected = Expected {
        user_id: "user-1",
        machine_id: "99",
        tokens: 3,
    };
    if validate_token(token, expected, received_at, now, SECRET).is_ok() {
        let ts = token.split('|').nth(3).and_then(|t| t.parse::<u64>().ok());
        let genuine = ts.map(|ts| sign_token("user-1", "99", 3, ts, SECRET));
        assert_eq!(genuine.as_deref(), Some(token), "forged token accepted");
    }
});
