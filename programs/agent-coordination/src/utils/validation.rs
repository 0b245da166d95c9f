//! Input validation utilities

/// Validates that a string contains only printable ASCII characters.
///
/// Rust's `String` already guarantees UTF-8; this additionally rejects
/// control characters and non-ASCII bytes, which have no place in endpoints
/// or metadata URIs that clients render and dial.
///
/// ```
/// use agent_coordination::utils::validation::validate_string_input;
///
/// assert!(validate_string_input("https://example.com/api"));
/// assert!(validate_string_input("hello world"));
/// assert!(!validate_string_input("hello\x00world"));
/// assert!(!validate_string_input("hello\nworld"));
/// ```
pub fn validate_string_input(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_graphic() || c == ' ')
}

/// Length check in bytes, matching the `#[max_len]` space reserved on-chain.
pub fn fits_max_len(s: &str, max_len: usize) -> bool {
    s.len() <= max_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_string_input("https://example.com/api/v1"));
        assert!(validate_string_input("http://localhost:8080"));
        assert!(validate_string_input("ipfs://QmHash123"));
        assert!(validate_string_input(
            "https://example.com/path?key=value&other=123"
        ));
    }

    #[test]
    fn test_control_characters_rejected() {
        assert!(!validate_string_input("agent\x00"));
        assert!(!validate_string_input("line\r\nbreak"));
        assert!(!validate_string_input("tab\tseparated"));
        assert!(!validate_string_input("\x1b[31mred"));
    }

    #[test]
    fn test_non_ascii_rejected() {
        assert!(!validate_string_input("caf\u{e9}"));
        assert!(!validate_string_input("https://\u{444}.example"));
    }

    #[test]
    fn test_empty_string_is_printable() {
        assert!(validate_string_input(""));
    }

    #[test]
    fn test_fits_max_len_counts_bytes() {
        assert!(fits_max_len(&"a".repeat(128), 128));
        assert!(!fits_max_len(&"a".repeat(129), 128));
    }
}
