//! Anti-plagiarism identity hashes
//!
//! A student's identity hash is SHA-256 over the UTF-8 bytes of their
//! canonical email (trimmed, lowercased), rendered as 64 lowercase hex
//! characters. It is embedded in the encrypted payload as a trailer and
//! sent alongside the ciphertext, so the backend can correlate submissions
//! without decrypting them.
//!
//! Trailer format (appended once to the answer):
//! ```text
//! <answer>\n\n--- Hash étudiant (anti-plagiat): <64 hex> ---
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Text between the answer and the hex digest
pub const TRAILER_PREFIX: &str = "\n\n--- Hash étudiant (anti-plagiat): ";

/// Text closing the trailer
pub const TRAILER_SUFFIX: &str = " ---";

/// Length of a hex-rendered SHA-256 digest
pub const IDENTITY_HASH_HEX_LEN: usize = 64;

/// Byte length of the trailer for any identity hash
pub const TRAILER_LEN: usize = TRAILER_PREFIX.len() + IDENTITY_HASH_HEX_LEN + TRAILER_SUFFIX.len();

/// Lowercase hex SHA-256 of a canonical email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityHash(String);

impl IdentityHash {
    /// Accept an already-rendered hash (e.g. `student_id_hash` from the
    /// backend). Returns `None` unless it is 64 lowercase hex characters.
    pub fn parse(hex_str: &str) -> Option<Self> {
        let valid = hex_str.len() == IDENTITY_HASH_HEX_LEN
            && hex_str
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex_str.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim surrounding whitespace and lowercase, so `" Alice@Example.COM "`
/// and `"alice@example.com"` hash identically.
pub fn canonicalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Derive the identity hash of a student email.
pub fn hash_identity(email: &str) -> IdentityHash {
    let canonical = canonicalize_email(email);
    let digest = Sha256::digest(canonical.as_bytes());
    IdentityHash(hex::encode(digest))
}

/// Append the identity trailer to an answer.
pub fn append_trailer(answer: &str, hash: &IdentityHash) -> String {
    let mut out = String::with_capacity(answer.len() + TRAILER_LEN);
    out.push_str(answer);
    out.push_str(TRAILER_PREFIX);
    out.push_str(hash.as_str());
    out.push_str(TRAILER_SUFFIX);
    out
}

/// Split a decrypted payload into the answer and its trailer hash.
///
/// Returns the whole text and `None` when no well-formed trailer ends the
/// payload.
pub fn split_trailer(payload: &str) -> (&str, Option<IdentityHash>) {
    let Some(rest) = payload.strip_suffix(TRAILER_SUFFIX) else {
        return (payload, None);
    };
    let Some(idx) = rest.rfind(TRAILER_PREFIX) else {
        return (payload, None);
    };
    let hash_part = &rest[idx + TRAILER_PREFIX.len()..];
    match IdentityHash::parse(hash_part) {
        Some(hash) => (&rest[..idx], Some(hash)),
        None => (payload, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // sha256("alice@example.com")
        assert_eq!(
            hash_identity("alice@example.com").as_str(),
            "ff8d9819fc0e12bf0d24892e45987e249a28dce836a85cad60e28eaaa8c6d976"
        );
    }

    #[test]
    fn test_canonicalization() {
        let a = hash_identity("alice@example.com");
        let b = hash_identity("  Alice@Example.COM\n");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_students_differ() {
        assert_ne!(hash_identity("alice@example.com"), hash_identity("bob@example.com"));
    }

    #[test]
    fn test_trailer_len_constant() {
        let hash = hash_identity("alice@example.com");
        assert_eq!(append_trailer("", &hash).len(), TRAILER_LEN);
    }

    #[test]
    fn test_trailer_format() {
        let hash = hash_identity("alice@example.com");
        let payload = append_trailer("Answer: 42", &hash);
        assert_eq!(
            payload,
            format!("Answer: 42\n\n--- Hash étudiant (anti-plagiat): {hash} ---")
        );
    }

    #[test]
    fn test_split_trailer_roundtrip() {
        let hash = hash_identity("alice@example.com");
        let payload = append_trailer("line one\nline two", &hash);
        let (body, found) = split_trailer(&payload);
        assert_eq!(body, "line one\nline two");
        assert_eq!(found, Some(hash));
    }

    #[test]
    fn test_split_trailer_missing() {
        let (body, found) = split_trailer("just an answer");
        assert_eq!(body, "just an answer");
        assert!(found.is_none());
    }

    #[test]
    fn test_split_trailer_malformed_hash() {
        let text = "answer\n\n--- Hash étudiant (anti-plagiat): NOTHEX ---";
        let (body, found) = split_trailer(text);
        assert_eq!(body, text);
        assert!(found.is_none());
    }

    #[test]
    fn test_parse_rejects_uppercase() {
        let upper = hash_identity("a@b.c").as_str().to_uppercase();
        assert!(IdentityHash::parse(&upper).is_none());
    }

    proptest! {
        #[test]
        fn hash_is_deterministic_and_fixed_length(email in "\\PC{0,80}") {
            let h1 = hash_identity(&email);
            let h2 = hash_identity(&email);
            prop_assert_eq!(&h1, &h2);
            prop_assert_eq!(h1.as_str().len(), IDENTITY_HASH_HEX_LEN);
            prop_assert!(IdentityHash::parse(h1.as_str()).is_some());
        }

        #[test]
        fn trailer_appended_exactly_once(answer in "\\PC{0,200}") {
            let hash = hash_identity("student@example.com");
            let payload = append_trailer(&answer, &hash);
            let (body, found) = split_trailer(&payload);
            prop_assert_eq!(body, answer.as_str());
            prop_assert_eq!(found, Some(hash));
        }
    }
}
