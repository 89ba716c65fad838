//! Input sanitization for user-supplied identity fields.

use crate::{AuthError, Result};

/// Characters allowed in display names besides ASCII alphanumerics.
const DISPLAY_NAME_EXTRA: &[char] = &['_', '-', '.', ' '];

/// Sanitize a display name: keep printable alphanumerics plus `_-. `,
/// collapse runs of whitespace, trim, and require 2–20 characters.
pub fn sanitize_display_name(raw: &str) -> Result<String> {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || DISPLAY_NAME_EXTRA.contains(c))
        .collect();

    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.len() < 2 || collapsed.len() > 20 {
        return Err(AuthError::Validation(
            "Display name must be 2-20 characters (letters, numbers, _-. )".into(),
        ));
    }
    Ok(collapsed)
}

/// Validate a username: 3–30 characters of lowercase alphanumerics and
/// underscore.
pub fn validate_username(raw: &str) -> Result<&str> {
    let ok = (3..=30).contains(&raw.len())
        && raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if !ok {
        return Err(AuthError::Validation(
            "Username must be 3-30 lowercase letters, digits or underscores".into(),
        ));
    }
    Ok(raw)
}

/// Validate a password before hashing. Bounded above because bcrypt
/// truncates at 72 bytes.
pub fn validate_password(raw: &str) -> Result<&str> {
    if raw.len() < 8 || raw.len() > 72 {
        return Err(AuthError::Validation(
            "Password must be 8-72 characters".into(),
        ));
    }
    Ok(raw)
}

/// Validate a hex-encoded 33-byte compressed secp256k1 linking key.
pub fn validate_linking_key(raw: &str) -> Result<&str> {
    let ok = raw.len() == 66
        && raw.bytes().all(|b| b.is_ascii_hexdigit())
        && (raw.starts_with("02") || raw.starts_with("03"));
    if !ok {
        return Err(AuthError::Validation("Invalid linking key".into()));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_are_filtered_and_collapsed() {
        assert_eq!(sanitize_display_name("alice").unwrap(), "alice");
        assert_eq!(sanitize_display_name("  alice   bob ").unwrap(), "alice bob");
        assert_eq!(sanitize_display_name("al<script>ice").unwrap(), "alscriptice");
        assert_eq!(sanitize_display_name("a.b-c_d").unwrap(), "a.b-c_d");
    }

    #[test]
    fn display_name_length_bounds() {
        assert!(sanitize_display_name("a").is_err());
        assert!(sanitize_display_name(&"x".repeat(21)).is_err());
        assert!(sanitize_display_name("💣💣💣").is_err());
        assert!(sanitize_display_name(&"x".repeat(20)).is_ok());
    }

    #[test]
    fn usernames() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("Alice").is_err());
        assert!(validate_username("alice!").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
    }

    #[test]
    fn linking_keys() {
        assert!(validate_linking_key(&format!("02{}", "ab".repeat(32))).is_ok());
        assert!(validate_linking_key(&format!("03{}", "ab".repeat(32))).is_ok());
        assert!(validate_linking_key(&format!("04{}", "ab".repeat(32))).is_err());
        assert!(validate_linking_key("02abcd").is_err());
    }
}
