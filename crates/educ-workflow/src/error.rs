use educ_core::EducError;
use educ_crypto::CryptoError;
use thiserror::Error;

use crate::student::SubmissionState;

pub type FlowResult<T> = Result<T, FlowError>;

/// Why a workflow step was refused or failed.
///
/// Nothing here is retried automatically. A failed submission rolls back to
/// `NotSubmitted` and the student retries by hand.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Educ(#[from] EducError),

    #[error("assignment {assignment_id} is past its due date")]
    Overdue { assignment_id: i64 },

    #[error("cannot {action} an assignment that is {state}")]
    InvalidTransition {
        state: SubmissionState,
        action: &'static str,
    },

    #[error("submission {0} has not been decrypted with the loaded key")]
    NotDecrypted(i64),

    #[error("submission {0} has already been graded")]
    AlreadyGraded(i64),

    #[error("{operation} did not finish within {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("private key handoff failed: {0}")]
    Handoff(String),
}

impl FlowError {
    /// Text shown to the person at the terminal.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::Crypto(
                CryptoError::Decryption(_) | CryptoError::KeyImport(_) | CryptoError::Decode(_),
            ) => "invalid key or corrupted content".into(),
            FlowError::Crypto(CryptoError::CryptoUnavailable(detail)) => {
                format!("secure cryptography is not available on this machine ({detail})")
            }
            FlowError::Crypto(CryptoError::Encryption(detail)) => {
                format!("could not encrypt the answer: {detail}")
            }
            FlowError::Educ(EducError::Network(detail)) => {
                format!("backend unreachable ({detail}); nothing was sent twice, retry when ready")
            }
            FlowError::Educ(EducError::Backend { message, .. }) => message.clone(),
            FlowError::NotDecrypted(_) => {
                "decrypt this submission with the matching private key before grading".into()
            }
            other => other.to_string(),
        }
    }

    /// True when the same request may be issued again by the user as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlowError::Educ(EducError::Network(_))
                | FlowError::Educ(EducError::Backend { status: 500..=599, .. })
                | FlowError::Timeout { .. }
                | FlowError::Crypto(CryptoError::CryptoUnavailable(_))
        )
    }
}
