//! educ-crypto: client-side confidentiality for assignment submissions
//!
//! Every assignment owns one RSA-2048 key pair generated on the professor's
//! machine. Only the public half ever reaches the backend; the private half
//! leaves this crate as a PEM-like envelope handed to the professor
//! out-of-band.
//!
//! Submission pipeline:
//! ```text
//! answer ─┬─ trailer(sha256(canonical email)) ─► payload
//!         │
//! payload ─► RSA-OAEP-SHA256(public key) ─► base64 ─► backend      (single block, ≤ 190 bytes)
//! payload ─► XChaCha20-Poly1305(content key) ┐
//! content key ─► RSA-OAEP-SHA256(public key) ┴─► "EDH1" frame ─► base64   (hybrid)
//! ```
//!
//! Grading pipeline:
//! ```text
//! pasted PRIVATE KEY envelope ─► PKCS#8 DER ─► RsaPrivateKey
//! base64 ciphertext ─► single block or EDH1 frame ─► UTF-8 plaintext (answer + trailer)
//! ```

pub mod envelope;
pub mod error;
pub mod hybrid;
pub mod identity;
pub mod keys;
pub mod open;
pub mod seal;

pub use envelope::{decode_envelope, encode_private_key, encode_public_key, KeyKind, PrivateKeyEnvelope};
pub use error::{CryptoError, CryptoResult};
pub use identity::{append_trailer, canonicalize_email, hash_identity, split_trailer, IdentityHash};
pub use keys::{fingerprint, generate_key_pair, import_private_key, import_public_key, KeyPair, PrivateKey};
pub use open::decrypt_submission;
pub use seal::{encrypt_submission, encrypt_submission_hybrid, max_payload_len, seal_submission, SealMode};

/// RSA modulus size for assignment key pairs
pub const RSA_KEY_BITS: usize = 2048;

/// Size of one RSA-2048 ciphertext block in bytes
pub const RSA_BLOCK_SIZE: usize = RSA_KEY_BITS / 8;

/// OAEP overhead with SHA-256: two digests plus two marker bytes
pub const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// Largest payload a single RSA-2048 OAEP-SHA256 block can carry (190 bytes)
pub const MAX_SINGLE_BLOCK_PAYLOAD: usize = RSA_BLOCK_SIZE - OAEP_SHA256_OVERHEAD;

/// Size of a hybrid content key (256-bit)
pub const CONTENT_KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
