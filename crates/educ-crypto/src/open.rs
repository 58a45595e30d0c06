//! Submission decryption with the assignment private key

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::hybrid;
use crate::keys::PrivateKey;

/// Decrypt a Base64 submission ciphertext to its UTF-8 payload.
///
/// Accepts both single-block ciphertexts and hybrid frames. Every failure
/// (bad Base64, wrong key, tampered bytes, invalid UTF-8) surfaces as
/// `Decryption` and leaves no partial plaintext behind.
pub fn decrypt_submission(ciphertext_b64: &str, key: &PrivateKey) -> CryptoResult<String> {
    let compact: String = ciphertext_b64.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CryptoError::Decryption(format!("ciphertext is not valid base64: {e}")))?;

    let plaintext = if raw.len() == key.block_size() {
        key.rsa()
            .decrypt(Oaep::new::<Sha256>(), &raw)
            .map_err(|_| CryptoError::Decryption("RSA-OAEP decryption failed".into()))?
    } else if hybrid::is_frame(&raw) {
        hybrid::open(key.rsa(), &raw)?
    } else {
        return Err(CryptoError::Decryption(format!(
            "ciphertext is {} bytes; expected one {}-byte block or a hybrid frame",
            raw.len(),
            key.block_size()
        )));
    };

    match String::from_utf8(plaintext) {
        Ok(text) => Ok(text),
        Err(e) => {
            e.into_bytes().zeroize();
            Err(CryptoError::Decryption("plaintext is not valid UTF-8".into()))
        }
    }
}
