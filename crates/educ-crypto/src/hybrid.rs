//! Hybrid sealing for answers too long for one RSA block
//!
//! Frame format (binary, Base64-encoded on the wire):
//! ```text
//! [4 bytes: "EDH1"][256 bytes: RSA-OAEP-SHA256(content key)][24 bytes: nonce][N bytes: ciphertext][16 bytes: tag]
//! AAD = "EDH1"
//! ```
//!
//! The content key is random per submission and never reused. The wrapped
//! key block is exactly one modulus wide, so a frame can never be confused
//! with a single-block ciphertext of the same key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::seal::encrypt_block;
use crate::{CONTENT_KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Magic prefix of a hybrid frame, also bound as AAD
pub const HYBRID_MAGIC: &[u8; 4] = b"EDH1";

/// Seal `payload` under a fresh content key wrapped for `key`.
pub(crate) fn seal(key: &RsaPublicKey, payload: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut content_key = Zeroizing::new([0u8; CONTENT_KEY_SIZE]);
    OsRng
        .try_fill_bytes(&mut content_key[..])
        .map_err(|e| CryptoError::CryptoUnavailable(format!("no secure random source: {e}")))?;

    let wrapped = encrypt_block(key, &content_key[..])?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::CryptoUnavailable(format!("no secure random source: {e}")))?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&content_key[..]));
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload {
                msg: payload,
                aad: HYBRID_MAGIC,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("content encryption failed: {e}")))?;

    let mut frame =
        Vec::with_capacity(HYBRID_MAGIC.len() + wrapped.len() + NONCE_SIZE + ciphertext.len());
    frame.extend_from_slice(HYBRID_MAGIC);
    frame.extend_from_slice(&wrapped);
    frame.extend_from_slice(&nonce_bytes);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// True when `raw` starts with the hybrid magic.
pub(crate) fn is_frame(raw: &[u8]) -> bool {
    raw.starts_with(HYBRID_MAGIC)
}

/// Open a hybrid frame. Every failure is reported as `Decryption`.
pub(crate) fn open(key: &RsaPrivateKey, frame: &[u8]) -> CryptoResult<Vec<u8>> {
    let block = key.size();
    let header = HYBRID_MAGIC.len() + block + NONCE_SIZE;
    if !is_frame(frame) || frame.len() < header + TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "hybrid frame too short: {} bytes (minimum {})",
            frame.len(),
            header + TAG_SIZE
        )));
    }

    let (wrapped, rest) = frame[HYBRID_MAGIC.len()..].split_at(block);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let content_key = Zeroizing::new(
        key.decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| CryptoError::Decryption(format!("content key unwrap failed: {e}")))?,
    );
    if content_key.len() != CONTENT_KEY_SIZE {
        return Err(CryptoError::Decryption(format!(
            "unwrapped content key is {} bytes, expected {CONTENT_KEY_SIZE}",
            content_key.len()
        )));
    }

    let cipher = XChaCha20Poly1305::new(Key::from_slice(content_key.as_slice()));
    cipher
        .decrypt(
            XNonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: HYBRID_MAGIC,
            },
        )
        .map_err(|_| CryptoError::Decryption("content authentication failed".into()))
}
