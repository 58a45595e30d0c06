//! educ-workflow: the confidential submission and grading flows
//!
//! Student, per assignment:
//! ```text
//! NotSubmitted ──submit──► Submitting ──encrypt + POST ok──► Submitted ──(professor grades)──► Graded
//!      │                        │
//!      │ past due               └── encrypt or POST failed ──► NotSubmitted (retry by hand)
//!      ▼
//!   Overdue
//! ```
//!
//! Professor: generate key pair → hand the private key off → upload the
//! public key with the assignment; later load the private key, decrypt a
//! pending submission (repeatable) and grade it once.

pub mod blocking;
pub mod error;
pub mod grading;
pub mod professor;
pub mod student;

pub use blocking::block_on_detached;
pub use error::{FlowError, FlowResult};
pub use grading::{DecryptedSubmission, GradingSession, TrailerCheck};
pub use professor::{create_assignment, generate_and_handoff, AssignmentDraft, CreatedWithKey, GeneratedKey};
pub use student::{list_assignments, AssignmentStatus, SubmissionFlow, SubmissionState};

use std::time::Duration;

use educ_core::config::CryptoConfig;
use educ_core::EducError;
use educ_crypto::SealMode;

/// Crypto settings resolved from `[crypto]` config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSettings {
    pub mode: SealMode,
    /// `None` waits for key generation indefinitely
    pub keygen_timeout: Option<Duration>,
}

impl FlowSettings {
    pub fn from_config(crypto: &CryptoConfig) -> FlowResult<Self> {
        let mode = crypto
            .mode
            .parse::<SealMode>()
            .map_err(|e| EducError::Config(format!("crypto.mode: {e}")))?;
        let keygen_timeout =
            (crypto.keygen_timeout_secs > 0).then(|| Duration::from_secs(crypto.keygen_timeout_secs));
        Ok(Self {
            mode,
            keygen_timeout,
        })
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            mode: SealMode::Auto,
            keygen_timeout: Some(Duration::from_secs(120)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let settings = FlowSettings::from_config(&CryptoConfig {
            mode: "hybrid".into(),
            keygen_timeout_secs: 0,
        })
        .unwrap();
        assert_eq!(settings.mode, SealMode::Hybrid);
        assert_eq!(settings.keygen_timeout, None);

        let defaults = FlowSettings::from_config(&CryptoConfig::default()).unwrap();
        assert_eq!(defaults, FlowSettings::default());
    }

    #[test]
    fn test_bad_mode_is_config_error() {
        let err = FlowSettings::from_config(&CryptoConfig {
            mode: "rot13".into(),
            keygen_timeout_secs: 5,
        })
        .unwrap_err();
        assert!(matches!(err, FlowError::Educ(EducError::Config(_))));
    }
}
