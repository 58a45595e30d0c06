//! PEM-like key envelopes
//!
//! Envelope format (text):
//! ```text
//! -----BEGIN PUBLIC KEY-----
//! <base64 of SPKI DER, wrapped at 64 columns>
//! -----END PUBLIC KEY-----
//! ```
//!
//! Private keys use the same shape with `PRIVATE KEY` delimiters around
//! PKCS#8 DER. Decoding is lenient: delimiter lines are optional and any
//! whitespace (CRLF, indentation from a paste) is ignored.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};

/// Column width of the Base64 body
pub const LINE_WIDTH: usize = 64;

/// Which half of a key pair an envelope carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    Private,
}

impl KeyKind {
    pub fn label(self) -> &'static str {
        match self {
            KeyKind::Public => "PUBLIC KEY",
            KeyKind::Private => "PRIVATE KEY",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "PUBLIC KEY" => Some(KeyKind::Public),
            "PRIVATE KEY" => Some(KeyKind::Private),
            _ => None,
        }
    }
}

/// Textual private key. Never persisted by educ; lives in memory until the
/// handoff or the decrypt that needs it is done. Zeroized on drop.
#[derive(Clone)]
pub struct PrivateKeyEnvelope(SecretString);

impl PrivateKeyEnvelope {
    pub fn new(text: String) -> Self {
        Self(SecretString::from(text))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for PrivateKeyEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKeyEnvelope")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Wrap SPKI DER bytes in a `PUBLIC KEY` envelope.
pub fn encode_public_key(der: &[u8]) -> String {
    encode(KeyKind::Public, der)
}

/// Wrap PKCS#8 DER bytes in a `PRIVATE KEY` envelope.
pub fn encode_private_key(der: &[u8]) -> PrivateKeyEnvelope {
    PrivateKeyEnvelope::new(encode(KeyKind::Private, der))
}

fn encode(kind: KeyKind, der: &[u8]) -> String {
    let mut body = STANDARD.encode(der);
    let label = kind.label();

    let mut out = String::with_capacity(body.len() + body.len() / LINE_WIDTH + 64);
    out.push_str("-----BEGIN ");
    out.push_str(label);
    out.push_str("-----\n");
    // Base64 output is ASCII, so byte chunks are valid str slices
    for line in body.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(line).unwrap_or_default());
        out.push('\n');
    }
    out.push_str("-----END ");
    out.push_str(label);
    out.push_str("-----\n");

    body.zeroize();
    out
}

/// Strip delimiter lines and whitespace, then Base64-decode the remainder.
pub fn decode_envelope(envelope: &str) -> CryptoResult<Vec<u8>> {
    decode_with_kind(envelope).map(|(_, der)| der)
}

/// Decode an envelope, also reporting the kind named by its delimiters
/// (`None` for a bare Base64 body).
pub(crate) fn decode_with_kind(envelope: &str) -> CryptoResult<(Option<KeyKind>, Vec<u8>)> {
    let mut kind = None;
    let mut body = String::with_capacity(envelope.len());

    for line in envelope.lines() {
        let line = line.trim();
        if let Some(label) = delimiter_label(line) {
            match KeyKind::from_label(label) {
                Some(k) if kind.is_none() || kind == Some(k) => kind = Some(k),
                Some(_) => {
                    body.zeroize();
                    return Err(CryptoError::Decode(
                        "envelope mixes PUBLIC KEY and PRIVATE KEY delimiters".into(),
                    ));
                }
                None => {
                    body.zeroize();
                    return Err(CryptoError::Decode(format!(
                        "unsupported envelope label: {label}"
                    )));
                }
            }
            continue;
        }
        body.extend(line.chars().filter(|c| !c.is_whitespace()));
    }

    if body.is_empty() {
        return Err(CryptoError::Decode("envelope contains no key material".into()));
    }

    let decoded = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CryptoError::Decode(format!("invalid base64: {e}")));
    body.zeroize();
    let der = decoded?;

    if der.is_empty() {
        return Err(CryptoError::Decode("envelope decodes to zero bytes".into()));
    }
    Ok((kind, der))
}

/// `-----BEGIN X-----` / `-----END X-----` → `X`
fn delimiter_label(line: &str) -> Option<&str> {
    let inner = line.strip_prefix("-----")?.strip_suffix("-----")?;
    inner
        .strip_prefix("BEGIN ")
        .or_else(|| inner.strip_prefix("END "))
        .map(str::trim)
}
