//! Out-of-band delivery of a freshly generated private key

use anyhow::{Context, Result};
use educ_core::config::{expand_tilde, HandoffConfig};
use educ_crypto::PrivateKeyEnvelope;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffMethod {
    Clipboard,
    File,
    Stdout,
}

impl std::str::FromStr for HandoffMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clipboard" => Ok(HandoffMethod::Clipboard),
            "file" => Ok(HandoffMethod::File),
            "stdout" => Ok(HandoffMethod::Stdout),
            other => anyhow::bail!("unknown handoff method '{other}' (expected clipboard, file or stdout)"),
        }
    }
}

impl std::fmt::Display for HandoffMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HandoffMethod::Clipboard => "clipboard",
            HandoffMethod::File => "file",
            HandoffMethod::Stdout => "stdout",
        })
    }
}

/// Where a private key ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffReceipt {
    pub method: HandoffMethod,
    /// File path for file handoffs
    pub path: Option<PathBuf>,
}

/// Delivers a private key envelope to the professor.
///
/// `label` names the key (e.g. `cry101-tp-rsa-1a2b3c4d5e6f7a8b`); file
/// handoffs use it as the file stem.
pub trait KeyHandoff: Send + Sync {
    fn deliver(&self, label: &str, envelope: &PrivateKeyEnvelope) -> Result<HandoffReceipt>;
}

/// System clipboard via arboard.
///
/// On X11/Wayland the selection is served by this process and vanishes when
/// it exits, so `deliver` blocks until another program (a clipboard manager,
/// or the next copy) takes ownership of it.
#[derive(Debug, Default)]
pub struct ClipboardHandoff;

impl ClipboardHandoff {
    /// True where the selection dies with the process and must be held.
    pub const fn holds_selection() -> bool {
        cfg!(all(
            unix,
            not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
        ))
    }
}

impl KeyHandoff for ClipboardHandoff {
    fn deliver(&self, label: &str, envelope: &PrivateKeyEnvelope) -> Result<HandoffReceipt> {
        let mut clipboard = arboard::Clipboard::new().context("opening system clipboard")?;
        set_and_hold(&mut clipboard, label, envelope.expose().to_string())
            .context("copying private key to clipboard")?;
        tracing::info!(label, "private key copied to clipboard");
        Ok(HandoffReceipt {
            method: HandoffMethod::Clipboard,
            path: None,
        })
    }
}

#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
))]
fn set_and_hold(
    clipboard: &mut arboard::Clipboard,
    label: &str,
    text: String,
) -> std::result::Result<(), arboard::Error> {
    use arboard::SetExtLinux;

    tracing::warn!(
        label,
        "holding the private key on the clipboard; paste it somewhere safe, then copy anything else to continue"
    );
    clipboard.set().wait().text(text)
}

#[cfg(not(all(
    unix,
    not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
)))]
fn set_and_hold(
    clipboard: &mut arboard::Clipboard,
    _label: &str,
    text: String,
) -> std::result::Result<(), arboard::Error> {
    clipboard.set_text(text)
}

/// New file in a key directory, owner-only, never overwriting.
#[derive(Debug)]
pub struct FileHandoff {
    dir: PathBuf,
}

impl FileHandoff {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}.pem", sanitize_label(label)))
    }
}

impl KeyHandoff for FileHandoff {
    fn deliver(&self, label: &str, envelope: &PrivateKeyEnvelope) -> Result<HandoffReceipt> {
        create_private_dir(&self.dir)?;
        let path = self.path_for(label);

        let mut file = open_new_private(&path).with_context(|| {
            format!(
                "creating {} (refusing to overwrite an existing key)",
                path.display()
            )
        })?;
        file.write_all(envelope.expose().as_bytes())
            .and_then(|_| file.sync_all())
            .with_context(|| format!("writing {}", path.display()))?;

        tracing::info!(label, path = %path.display(), "private key written");
        Ok(HandoffReceipt {
            method: HandoffMethod::File,
            path: Some(path),
        })
    }
}

/// Prints the envelope on stdout, for piping into a password manager.
#[derive(Debug, Default)]
pub struct StdoutHandoff;

impl KeyHandoff for StdoutHandoff {
    fn deliver(&self, label: &str, envelope: &PrivateKeyEnvelope) -> Result<HandoffReceipt> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        out.write_all(envelope.expose().as_bytes())
            .and_then(|_| out.flush())
            .context("writing private key to stdout")?;
        tracing::debug!(label, "private key written to stdout");
        Ok(HandoffReceipt {
            method: HandoffMethod::Stdout,
            path: None,
        })
    }
}

/// Handoff selected by `[handoff]` config.
pub fn handoff_for(config: &HandoffConfig) -> Result<Box<dyn KeyHandoff>> {
    let method: HandoffMethod = config.method.parse()?;
    Ok(match method {
        HandoffMethod::Clipboard => Box::new(ClipboardHandoff),
        HandoffMethod::File => Box::new(FileHandoff::new(expand_tilde(&config.key_dir))),
        HandoffMethod::Stdout => Box::new(StdoutHandoff),
    })
}

/// Keep `[A-Za-z0-9._-]`, map everything else to `-`.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "assignment-key".into()
    } else {
        trimmed.to_string()
    }
}

fn create_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("restricting {}", dir.display()))?;
    }
    Ok(())
}

pub(crate) fn open_new_private(path: &Path) -> std::io::Result<std::fs::File> {
    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use educ_crypto::encode_private_key;

    fn envelope() -> PrivateKeyEnvelope {
        encode_private_key(&[0x30u8; 48])
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("Clipboard".parse::<HandoffMethod>().unwrap(), HandoffMethod::Clipboard);
        assert_eq!("file".parse::<HandoffMethod>().unwrap(), HandoffMethod::File);
        assert!("email".parse::<HandoffMethod>().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_clipboard_holds_selection_on_linux() {
        assert!(ClipboardHandoff::holds_selection());
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_clipboard_hands_off_immediately_on_macos() {
        assert!(!ClipboardHandoff::holds_selection());
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("CRY101 / TP RSA"), "CRY101---TP-RSA");
        assert_eq!(sanitize_label("../../etc/passwd"), "etc-passwd");
        assert_eq!(sanitize_label("///"), "assignment-key");
    }

    #[test]
    fn test_file_handoff_writes_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = FileHandoff::new(dir.path().join("keys"));

        let receipt = handoff.deliver("cry101-tp-rsa", &envelope()).unwrap();
        let path = receipt.path.unwrap();
        assert_eq!(path, dir.path().join("keys/cry101-tp-rsa.pem"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), envelope().expose());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_handoff_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let handoff = FileHandoff::new(dir.path());
        let path = handoff.deliver("k", &envelope()).unwrap().path.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_handoff_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = FileHandoff::new(dir.path());
        let existing = handoff.path_for("k");
        std::fs::write(&existing, "precious").unwrap();

        let err = handoff.deliver("k", &envelope()).unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "precious");
    }

    #[test]
    fn test_handoff_for_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = HandoffConfig {
            method: "file".into(),
            key_dir: dir.path().to_path_buf(),
        };
        let handoff = handoff_for(&config).unwrap();
        let receipt = handoff.deliver("from-config", &envelope()).unwrap();
        assert_eq!(receipt.method, HandoffMethod::File);

        let bad = HandoffConfig {
            method: "carrier-pigeon".into(),
            ..config
        };
        assert!(handoff_for(&bad).is_err());
    }
}
