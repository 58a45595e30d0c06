//! Professor side: decrypt pending submissions and grade them once
//!
//! The session keeps the loaded private key and at most one decrypted
//! answer. Decrypting is repeatable; a failed attempt drops the previous
//! plaintext, so a grade is only accepted right after a successful decrypt
//! of that submission.

use std::collections::HashSet;
use std::sync::Arc;

use educ_backend::{Backend, SubmissionRepository};
use educ_core::types::{Ack, Grade, GradeRecord, PendingSubmission};
use educ_core::{EducError, Role, Session};
use educ_crypto::{decrypt_submission, import_private_key, split_trailer, CryptoError, IdentityHash, PrivateKey, PrivateKeyEnvelope};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::blocking::run_blocking;
use crate::error::{FlowError, FlowResult};

/// Outcome of comparing the decrypted trailer with `student_id_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrailerCheck {
    Match,
    /// The answer carries someone else's identity hash
    Mismatch { embedded: IdentityHash },
    /// No well-formed trailer at the end of the plaintext
    Missing,
}

/// A decrypted answer, trailer removed.
pub struct DecryptedSubmission {
    submission_id: i64,
    answer: Zeroizing<String>,
    trailer: TrailerCheck,
}

impl DecryptedSubmission {
    pub fn submission_id(&self) -> i64 {
        self.submission_id
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn trailer(&self) -> &TrailerCheck {
        &self.trailer
    }
}

impl std::fmt::Debug for DecryptedSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedSubmission")
            .field("submission_id", &self.submission_id)
            .field("answer", &"[REDACTED]")
            .field("trailer", &self.trailer)
            .finish()
    }
}

pub struct GradingSession {
    backend: Arc<dyn Backend>,
    session: Session,
    key: Option<Arc<PrivateKey>>,
    fingerprint: Option<String>,
    current: Option<DecryptedSubmission>,
    graded: HashSet<i64>,
}

impl std::fmt::Debug for GradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingSession")
            .field("professor", &self.session.email)
            .field("fingerprint", &self.fingerprint)
            .field("current", &self.current.as_ref().map(|d| d.submission_id))
            .finish_non_exhaustive()
    }
}

impl GradingSession {
    pub fn new(backend: Arc<dyn Backend>, session: &Session) -> FlowResult<Self> {
        session.require_role(Role::Professor)?;
        Ok(Self {
            backend,
            session: session.clone(),
            key: None,
            fingerprint: None,
            current: None,
            graded: HashSet::new(),
        })
    }

    /// Ungraded submissions to the professor's assignments, newest first.
    pub async fn pending(&self) -> FlowResult<Vec<PendingSubmission>> {
        Ok(self.backend.pending(&self.session.email).await?)
    }

    /// One pending submission by id (`Backend{404}` when absent).
    pub async fn find(&self, submission_id: i64) -> FlowResult<PendingSubmission> {
        self.pending()
            .await?
            .into_iter()
            .find(|s| s.id == submission_id)
            .ok_or_else(|| {
                EducError::backend(404, format!("no pending submission {submission_id}")).into()
            })
    }

    /// Import a pasted private key, replacing any previous one. Returns the
    /// fingerprint of its public half.
    pub async fn load_key(&mut self, envelope: PrivateKeyEnvelope) -> FlowResult<String> {
        self.clear();
        let key = run_blocking("import private key", None, move || {
            import_private_key(envelope.expose())
        })
        .await?;
        let fingerprint = key.fingerprint()?;
        debug!(fingerprint = %fingerprint, "private key loaded");

        self.key = Some(Arc::new(key));
        self.fingerprint = Some(fingerprint.clone());
        Ok(fingerprint)
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Decrypt `submission` with the loaded key.
    pub async fn decrypt(&mut self, submission: &PendingSubmission) -> FlowResult<&DecryptedSubmission> {
        self.current = None;
        let key = self
            .key
            .clone()
            .ok_or_else(|| CryptoError::KeyImport("no private key loaded".into()))?;

        let ciphertext = submission.encrypted_content.clone();
        let plaintext = run_blocking("decrypt submission", None, move || {
            decrypt_submission(&ciphertext, &key).map(Zeroizing::new)
        })
        .await
        .map_err(|e| {
            warn!(submission_id = submission.id, error = %e, "decryption failed");
            e
        })?;

        let (answer, embedded) = split_trailer(&plaintext);
        let expected = submission.student_id_hash.trim().to_ascii_lowercase();
        let trailer = match embedded {
            Some(hash) if hash.as_str() == expected => TrailerCheck::Match,
            Some(hash) => TrailerCheck::Mismatch { embedded: hash },
            None => TrailerCheck::Missing,
        };
        if trailer != TrailerCheck::Match {
            warn!(submission_id = submission.id, trailer = ?trailer, "identity trailer does not match student_id_hash");
        }
        info!(submission_id = submission.id, bytes = answer.len(), "submission decrypted");

        Ok(&*self.current.insert(DecryptedSubmission {
            submission_id: submission.id,
            answer: Zeroizing::new(answer.to_string()),
            trailer,
        }))
    }

    /// The last successful decrypt, if any.
    pub fn current(&self) -> Option<&DecryptedSubmission> {
        self.current.as_ref()
    }

    pub fn can_grade(&self, submission_id: i64) -> bool {
        !self.graded.contains(&submission_id)
            && self
                .current
                .as_ref()
                .is_some_and(|d| d.submission_id == submission_id)
    }

    /// POST a grade for the currently decrypted submission. Not reversible.
    pub async fn grade(&mut self, submission_id: i64, grade: f64, feedback: &str) -> FlowResult<Ack> {
        if self.graded.contains(&submission_id) {
            return Err(FlowError::AlreadyGraded(submission_id));
        }
        let grade = Grade::new(grade)?;
        if !self.can_grade(submission_id) {
            return Err(FlowError::NotDecrypted(submission_id));
        }

        let record = GradeRecord {
            submission_id,
            grade,
            feedback: feedback.trim().to_string(),
            professor_email: self.session.email.clone(),
        };
        match self.backend.grade(&record).await {
            Ok(ack) => {
                self.graded.insert(submission_id);
                self.current = None;
                info!(submission_id, grade = grade.value(), "submission graded");
                Ok(ack)
            }
            Err(EducError::Backend { status: 400, message }) if is_already_graded(&message) => {
                self.graded.insert(submission_id);
                self.current = None;
                Err(FlowError::AlreadyGraded(submission_id))
            }
            // Plaintext is kept so the professor can retry by hand
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the key and any plaintext.
    pub fn clear(&mut self) {
        self.key = None;
        self.fingerprint = None;
        self.current = None;
    }
}

fn is_already_graded(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("déjà été notée") || lower.contains("already graded")
}
