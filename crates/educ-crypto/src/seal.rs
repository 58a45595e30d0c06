//! Submission encryption under an assignment public key

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::identity::{append_trailer, IdentityHash};
use crate::keys::import_public_key;
use crate::OAEP_SHA256_OVERHEAD;

/// How a student's payload is sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SealMode {
    /// One RSA-OAEP block; payloads over the block capacity are refused.
    Single,
    /// XChaCha20-Poly1305 content key wrapped with RSA-OAEP.
    Hybrid,
    /// Single block when the payload fits, hybrid otherwise.
    #[default]
    Auto,
}

impl FromStr for SealMode {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(SealMode::Single),
            "hybrid" => Ok(SealMode::Hybrid),
            "auto" => Ok(SealMode::Auto),
            other => Err(CryptoError::Encryption(format!(
                "unknown seal mode '{other}' (expected single, hybrid or auto)"
            ))),
        }
    }
}

impl std::fmt::Display for SealMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SealMode::Single => "single",
            SealMode::Hybrid => "hybrid",
            SealMode::Auto => "auto",
        })
    }
}

/// Largest payload one OAEP-SHA256 block can carry under `key`.
pub fn max_payload_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(OAEP_SHA256_OVERHEAD)
}

/// Encrypt `plaintext` plus the identity trailer as one RSA-OAEP-SHA256
/// block and return it Base64-encoded.
///
/// Fails with `Encryption` if the envelope is malformed or the combined
/// payload exceeds the block capacity; nothing is ever truncated.
pub fn encrypt_submission(
    plaintext: &str,
    identity: &IdentityHash,
    public_key_envelope: &str,
) -> CryptoResult<String> {
    let key = import_for_encryption(public_key_envelope)?;
    let payload = append_trailer(plaintext, identity);
    let block = encrypt_block(&key, payload.as_bytes())?;
    Ok(STANDARD.encode(block))
}

/// Encrypt `plaintext` plus the identity trailer with a fresh content key
/// wrapped under the public key. No size limit.
pub fn encrypt_submission_hybrid(
    plaintext: &str,
    identity: &IdentityHash,
    public_key_envelope: &str,
) -> CryptoResult<String> {
    let key = import_for_encryption(public_key_envelope)?;
    let payload = append_trailer(plaintext, identity);
    let frame = crate::hybrid::seal(&key, payload.as_bytes())?;
    Ok(STANDARD.encode(frame))
}

/// Encrypt with the requested mode. Returns the Base64 ciphertext and the
/// mode actually used (`Auto` resolves to `Single` or `Hybrid`).
pub fn seal_submission(
    plaintext: &str,
    identity: &IdentityHash,
    public_key_envelope: &str,
    mode: SealMode,
) -> CryptoResult<(String, SealMode)> {
    let resolved = match mode {
        SealMode::Auto => {
            let key = import_for_encryption(public_key_envelope)?;
            let payload_len = plaintext.len() + crate::identity::TRAILER_LEN;
            if payload_len <= max_payload_len(&key) {
                SealMode::Single
            } else {
                SealMode::Hybrid
            }
        }
        fixed => fixed,
    };

    let ciphertext = match resolved {
        SealMode::Hybrid => encrypt_submission_hybrid(plaintext, identity, public_key_envelope)?,
        _ => encrypt_submission(plaintext, identity, public_key_envelope)?,
    };
    tracing::debug!(mode = %resolved, bytes = plaintext.len(), "sealed submission");
    Ok((ciphertext, resolved))
}

fn import_for_encryption(envelope: &str) -> CryptoResult<RsaPublicKey> {
    if envelope.trim().is_empty() {
        return Err(CryptoError::Encryption("assignment has no public key".into()));
    }
    import_public_key(envelope).map_err(|e| CryptoError::Encryption(format!("invalid public key: {e}")))
}

pub(crate) fn encrypt_block(key: &RsaPublicKey, payload: &[u8]) -> CryptoResult<Vec<u8>> {
    let max = max_payload_len(key);
    if payload.len() > max {
        return Err(CryptoError::Encryption(format!(
            "payload is {} bytes but one RSA-OAEP-SHA256 block holds at most {max}; \
             shorten the answer or use hybrid mode",
            payload.len()
        )));
    }
    key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), payload)
        .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP encryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{hash_identity, TRAILER_LEN};
    use crate::keys::tests::shared_pair;
    use crate::{MAX_SINGLE_BLOCK_PAYLOAD, RSA_BLOCK_SIZE};

    fn public_pem() -> String {
        shared_pair().public_envelope().unwrap()
    }

    #[test]
    fn test_max_payload_is_190() {
        assert_eq!(max_payload_len(shared_pair().public_key()), MAX_SINGLE_BLOCK_PAYLOAD);
        assert_eq!(MAX_SINGLE_BLOCK_PAYLOAD, 190);
    }

    #[test]
    fn test_single_block_ciphertext_length() {
        let hash = hash_identity("alice@example.com");
        let ct = encrypt_submission("Answer: 42", &hash, &public_pem()).unwrap();

        // 256 raw bytes → 344 Base64 characters
        assert_eq!(ct.len(), 344);
        assert_eq!(STANDARD.decode(&ct).unwrap().len(), RSA_BLOCK_SIZE);
    }

    #[test]
    fn test_encryption_is_randomized() {
        let hash = hash_identity("alice@example.com");
        let pem = public_pem();
        let a = encrypt_submission("same", &hash, &pem).unwrap();
        let b = encrypt_submission("same", &hash, &pem).unwrap();
        assert_ne!(a, b, "OAEP must use fresh randomness");
    }

    #[test]
    fn test_exact_capacity_accepted() {
        let hash = hash_identity("alice@example.com");
        let answer = "x".repeat(MAX_SINGLE_BLOCK_PAYLOAD - TRAILER_LEN);
        assert!(encrypt_submission(&answer, &hash, &public_pem()).is_ok());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let hash = hash_identity("alice@example.com");
        let answer = "x".repeat(MAX_SINGLE_BLOCK_PAYLOAD - TRAILER_LEN + 1);
        let err = encrypt_submission(&answer, &hash, &public_pem()).unwrap_err();
        assert!(matches!(err, CryptoError::Encryption(_)));
        assert!(err.to_string().contains("190"));
    }

    #[test]
    fn test_malformed_public_key_is_encryption_error() {
        let hash = hash_identity("alice@example.com");
        for bad in ["", "   ", "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n", "%%%"] {
            let err = encrypt_submission("hi", &hash, bad).unwrap_err();
            assert!(matches!(err, CryptoError::Encryption(_)), "input {bad:?} gave {err:?}");
        }
    }

    #[test]
    fn test_auto_picks_single_when_it_fits() {
        let hash = hash_identity("alice@example.com");
        let (ct, mode) = seal_submission("short", &hash, &public_pem(), SealMode::Auto).unwrap();
        assert_eq!(mode, SealMode::Single);
        assert_eq!(ct.len(), 344);
    }

    #[test]
    fn test_auto_falls_back_to_hybrid() {
        let hash = hash_identity("alice@example.com");
        let essay = "Lorem ipsum dolor sit amet. ".repeat(40);
        let (_, mode) = seal_submission(&essay, &hash, &public_pem(), SealMode::Auto).unwrap();
        assert_eq!(mode, SealMode::Hybrid);
    }

    #[test]
    fn test_single_mode_never_falls_back() {
        let hash = hash_identity("alice@example.com");
        let essay = "Lorem ipsum dolor sit amet. ".repeat(40);
        let err = seal_submission(&essay, &hash, &public_pem(), SealMode::Single).unwrap_err();
        assert!(matches!(err, CryptoError::Encryption(_)));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("single".parse::<SealMode>().unwrap(), SealMode::Single);
        assert_eq!(" Hybrid ".parse::<SealMode>().unwrap(), SealMode::Hybrid);
        assert_eq!("auto".parse::<SealMode>().unwrap(), SealMode::Auto);
        assert!("chunked".parse::<SealMode>().is_err());
    }
}
