//! Content addressing for fragments.
//!
//! A fragment's id is the SHA-256 of its normalized text concatenated with
//! its source URI and version tag, rendered as lowercase hex. The
//! normalization rule is part of the contract: two fragments that differ
//! only in casing, whitespace runs, or stripped punctuation collapse to the
//! same id, and that id must be reproducible in any process or language.
//!
//! # Normalization
//!
//! Applied in this order:
//!
//! 1. Lowercase (Unicode lowercasing).
//! 2. Collapse every whitespace run into a single space and trim both ends.
//! 3. Drop every character that is not an ASCII word character
//!    (`[A-Za-z0-9_]`), whitespace, `-`, or `.`.
//!
//! Word characters are ASCII only, matching `\w` in JavaScript and in
//! Python's `re.ASCII` mode, so `"Größe"` normalizes to `"gre"`. Stripping
//! runs after collapsing, so a space-separated punctuation mark leaves two
//! spaces behind: `"a , b"` becomes `"a  b"`.
//!
//! ```rust
//! use recall_harness_core::address::{content_id, normalize};
//!
//! assert_eq!(normalize("  Hello,   World!  "), "hello world");
//! assert_eq!(
//!     content_id("Hello   world", "mem://notes", "v1"),
//!     content_id("hello world", "mem://notes", "v1"),
//! );
//! ```

use sha2::{Digest, Sha256};

/// Normalize text for content addressing.
pub fn normalize(text: &str) -> String {
    let collapsed = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
        .chars()
        .filter(|&c| is_word_char(c) || c.is_whitespace() || c == '-' || c == '.')
        .collect()
}

/// Derive the content id of a fragment.
///
/// Empty input yields the digest of `source_uri + version_tag` alone (the
/// digest of the empty string when both are empty as well); callers must
/// not store such fragments.
pub fn content_id(text: &str, source_uri: &str, version_tag: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hasher.update(source_uri.as_bytes());
    hasher.update(version_tag.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("a \t\n  b"), "a b");
    }

    #[test]
    fn test_normalize_strips_punctuation_keeps_allowed() {
        assert_eq!(normalize("v1.2-rc_3: done!"), "v1.2-rc_3 done");
    }

    #[test]
    fn test_normalize_strips_after_collapsing() {
        assert_eq!(normalize("a , b"), "a  b");
        assert_eq!(normalize("x !"), "x ");
        assert_ne!(content_id("a , b", "s", "v1"), content_id("a b", "s", "v1"));
    }

    #[test]
    fn test_normalize_word_chars_are_ascii() {
        assert_eq!(normalize("Größe ÜBER"), "gre ber");
        assert_eq!(normalize("naïve café"), "nave caf");
    }

    #[test]
    fn test_content_id_is_hex_sha256() {
        let id = content_id("text", "src", "v1");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_input_is_empty_string_digest() {
        assert_eq!(
            content_id("", "", ""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_casing_and_whitespace_collapse() {
        let a = content_id("The  Quick\nBrown Fox.", "repo://x", "v2");
        let b = content_id("the quick brown fox.", "repo://x", "v2");
        assert_eq!(a, b);
    }

    #[test]
    fn test_provenance_changes_id() {
        let a = content_id("same text", "repo://x", "v1");
        assert_ne!(a, content_id("same text", "repo://y", "v1"));
        assert_ne!(a, content_id("same text", "repo://x", "v2"));
    }
}
