//! Private key discovery for grading

use anyhow::{Context, Result};
use educ_core::config::expand_tilde;
use educ_crypto::PrivateKeyEnvelope;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const END_PRIVATE_KEY: &str = "-----END PRIVATE KEY-----";

/// A located private key envelope
pub struct KeySource {
    pub envelope: PrivateKeyEnvelope,
    pub origin: String,
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySource")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Discover a private key using the non-interactive part of the chain:
///   1. `explicit` path (from `--key-file`)
///   2. $EDUC_PRIVATE_KEY_FILE
///   3. $EDUC_PRIVATE_KEY
///
/// Returns `Ok(None)` when nothing is configured, leaving the interactive
/// paste to the caller.
pub async fn find_private_key(explicit: Option<&Path>) -> Result<Option<KeySource>> {
    find_private_key_with(explicit, |name| std::env::var(name).ok()).await
}

pub(crate) async fn find_private_key_with<F>(explicit: Option<&Path>, env: F) -> Result<Option<KeySource>>
where
    F: Fn(&str) -> Option<String>,
{
    // 1. --key-file
    if let Some(path) = explicit {
        let path = expand_tilde(path);
        return read_key_file(&path, "--key-file").await.map(Some);
    }

    // 2. EDUC_PRIVATE_KEY_FILE
    if let Some(key_file) = env("EDUC_PRIVATE_KEY_FILE").filter(|v| !v.trim().is_empty()) {
        let path = expand_tilde(&PathBuf::from(key_file));
        return read_key_file(&path, "EDUC_PRIVATE_KEY_FILE").await.map(Some);
    }

    // 3. EDUC_PRIVATE_KEY (literal envelope)
    if let Some(content) = env("EDUC_PRIVATE_KEY") {
        let content = Zeroizing::new(content);
        if !content.trim().is_empty() {
            return Ok(Some(KeySource {
                envelope: PrivateKeyEnvelope::new(content.to_string()),
                origin: "EDUC_PRIVATE_KEY (env)".into(),
            }));
        }
    }

    Ok(None)
}

async fn read_key_file(path: &Path, via: &str) -> Result<KeySource> {
    let content = Zeroizing::new(
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {via}: {}", path.display()))?,
    );
    if content.trim().is_empty() {
        anyhow::bail!("{via}: {} is empty", path.display());
    }
    tracing::debug!(path = %path.display(), "private key loaded from file");
    Ok(KeySource {
        envelope: PrivateKeyEnvelope::new(content.to_string()),
        origin: format!("{via}:{}", path.display()),
    })
}

/// Read a pasted envelope, stopping after the `END PRIVATE KEY` line or at
/// end of input.
pub fn read_pasted_key<R: BufRead>(reader: R) -> Result<PrivateKeyEnvelope> {
    let mut text = Zeroizing::new(String::new());
    for line in reader.lines() {
        let line = Zeroizing::new(line.context("reading pasted private key")?);
        text.push_str(line.trim_end());
        text.push('\n');
        if line.trim() == END_PRIVATE_KEY {
            break;
        }
    }
    if text.trim().is_empty() {
        anyhow::bail!("no private key was pasted");
    }
    Ok(PrivateKeyEnvelope::new(text.to_string()))
}
