use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures of the submission crypto core.
///
/// None of these is recovered automatically: each one is surfaced to the
/// user, who retries by hand (new browser/machine, re-pasted key, shorter
/// answer).
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No secure random source or primitive support on this machine.
    #[error("cryptography unavailable: {0}")]
    CryptoUnavailable(String),

    /// Envelope text is not valid Base64 or carries no key material.
    #[error("malformed key envelope: {0}")]
    Decode(String),

    /// Envelope decoded but is not an RSA key usable for this operation.
    #[error("key import failed: {0}")]
    KeyImport(String),

    /// Public key unusable or payload larger than one RSA-OAEP block.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrong private key, corrupted ciphertext, or non-UTF-8 plaintext.
    #[error("decryption failed: {0}")]
    Decryption(String),
}
