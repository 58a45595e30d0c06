use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EducError, EducResult};

/// Default config location, relative to `$HOME`
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/educ/config.toml";

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EducConfig {
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub crypto: CryptoConfig,
    pub handoff: HandoffConfig,
    pub log: LogConfig,
}

impl EducConfig {
    /// Parse a config file; a missing file yields all defaults.
    pub fn load(path: &Path) -> EducResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| EducError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// REST API root (default: http://127.0.0.1:8000/api)
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Refuse plain-http base URLs instead of warning
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where `educ login` stores the session JSON
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Submission sealing: "single", "hybrid", or "auto"
    pub mode: String,
    /// Key generation timeout in seconds (0 = none)
    pub keygen_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Private key delivery: "clipboard", "file", or "stdout"
    pub method: String,
    /// Directory for "file" handoffs
    pub key_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".into(),
            timeout_secs: 30,
            enforce_tls: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("~/.config/educ/session.json"),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            mode: "auto".into(),
            keygen_timeout_secs: 120,
        }
    }
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            method: "clipboard".into(),
            key_dir: PathBuf::from("~/.local/share/educ/keys"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        return home_dir().join(rest);
    }
    path.to_path_buf()
}
