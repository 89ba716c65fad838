//! CSRF double-submit tokens.
//!
//! The server mints a random token into a same-site cookie; mutating
//! requests must echo it in a header. The two copies are compared in
//! constant time. Safe methods and the HMAC-signed webhook path are
//! exempt (the transport layer enforces the exemptions).

use arena_common::constant_time_eq;
use rand::RngCore;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Mint a 64-hex CSRF token.
pub fn mint_csrf_token() -> String {
    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Validate the double-submit pair.
pub fn validate_csrf(cookie: Option<&str>, header: Option<&str>) -> bool {
    match (cookie, header) {
        (Some(cookie), Some(header)) => {
            is_token_shaped(cookie) && constant_time_eq(cookie.as_bytes(), header.as_bytes())
        }
        _ => false,
    }
}

fn is_token_shaped(token: &str) -> bool {
    token.len() == 64 && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_pair_validates() {
        let token = mint_csrf_token();
        assert!(validate_csrf(Some(&token), Some(&token)));
    }

    #[test]
    fn missing_or_mismatched_fails() {
        let token = mint_csrf_token();
        let other = mint_csrf_token();
        assert!(!validate_csrf(Some(&token), None));
        assert!(!validate_csrf(None, Some(&token)));
        assert!(!validate_csrf(Some(&token), Some(&other)));
        assert!(!validate_csrf(None, None));
    }

    #[test]
    fn malformed_cookie_fails() {
        assert!(!validate_csrf(Some("short"), Some("short")));
        let upper = mint_csrf_token().to_uppercase();
        assert!(!validate_csrf(Some(&upper), Some(&upper)));
    }
}
