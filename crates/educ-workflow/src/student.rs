//! Student side: per-assignment submission state machine

use std::sync::Arc;

use chrono::{DateTime, Utc};
use educ_backend::{AssignmentRepository, Backend, SubmissionRepository};
use educ_core::types::{Assignment, NewSubmission, StudentSubmission, SubmissionReceipt, SubmissionStatus};
use educ_core::{EducError, Role, Session};
use educ_crypto::{hash_identity, seal_submission, CryptoError, SealMode};
use tracing::{debug, info, warn};

use crate::blocking::run_blocking;
use crate::error::{FlowError, FlowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionState {
    NotSubmitted,
    /// Encryption or the POST is in flight
    Submitting,
    Submitted,
    Graded,
    /// Past the due date without a submission; terminal
    Overdue,
}

impl SubmissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionState::NotSubmitted => "not submitted",
            SubmissionState::Submitting => "submitting",
            SubmissionState::Submitted => "submitted",
            SubmissionState::Graded => "graded",
            SubmissionState::Overdue => "overdue",
        }
    }

    /// Derive the state of `assignment` from the listing flags and the
    /// student's submission history.
    pub fn derive(
        assignment: &Assignment,
        history: &[StudentSubmission],
        now: DateTime<Utc>,
    ) -> Self {
        let row = history.iter().find(|s| s.is_for(assignment));
        match row {
            Some(s) if s.status == SubmissionStatus::Graded => SubmissionState::Graded,
            Some(_) => SubmissionState::Submitted,
            None if assignment.has_submitted => SubmissionState::Submitted,
            None if assignment.is_past_due(now) => SubmissionState::Overdue,
            None => SubmissionState::NotSubmitted,
        }
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `educ assignments`.
#[derive(Debug, Clone)]
pub struct AssignmentStatus {
    pub assignment: Assignment,
    pub state: SubmissionState,
    /// Grade as rendered by the backend, once graded
    pub grade: Option<String>,
    pub feedback: Option<String>,
}

/// Every assignment visible to the signed-in student, with its derived state.
pub async fn list_assignments(
    backend: &dyn Backend,
    session: &Session,
    now: DateTime<Utc>,
) -> FlowResult<Vec<AssignmentStatus>> {
    session.require_role(Role::Student)?;
    let assignments = backend.list_for_student(&session.email).await?;
    let history = backend.history(&session.email).await?;

    Ok(assignments
        .into_iter()
        .map(|assignment| {
            let state = SubmissionState::derive(&assignment, &history, now);
            let row = history.iter().find(|s| s.is_for(&assignment));
            AssignmentStatus {
                grade: row.and_then(|s| s.grade.clone()),
                feedback: row
                    .map(|s| s.feedback.clone())
                    .filter(|f| !f.trim().is_empty()),
                state,
                assignment,
            }
        })
        .collect())
}

/// Submission flow for one assignment.
///
/// ```text
/// NotSubmitted ─submit─► Submitting ─ok─► Submitted ─refresh─► Graded
///                            └─err─► NotSubmitted
/// ```
pub struct SubmissionFlow {
    backend: Arc<dyn Backend>,
    session: Session,
    mode: SealMode,
    assignment: Assignment,
    state: SubmissionState,
    receipt: Option<SubmissionReceipt>,
}

impl std::fmt::Debug for SubmissionFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionFlow")
            .field("assignment_id", &self.assignment.id)
            .field("student", &self.session.email)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SubmissionFlow {
    /// Fetch the assignment (with its public key) and the student's history.
    pub async fn open(
        backend: Arc<dyn Backend>,
        session: &Session,
        assignment_id: i64,
        mode: SealMode,
        now: DateTime<Utc>,
    ) -> FlowResult<Self> {
        session.require_role(Role::Student)?;
        let assignment = backend.get(&session.email, assignment_id).await?;
        let history = backend.history(&session.email).await?;
        let state = SubmissionState::derive(&assignment, &history, now);
        debug!(assignment_id, %state, "submission flow opened");

        Ok(Self {
            backend,
            session: session.clone(),
            mode,
            assignment,
            state,
            receipt: None,
        })
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Receipt of the submission made through this flow.
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    /// Encrypt `answer` under the assignment public key and POST it once.
    ///
    /// Any failure after the flow enters `Submitting` rolls it back to
    /// `NotSubmitted`; calling `submit` again is the retry.
    pub async fn submit(&mut self, answer: &str, now: DateTime<Utc>) -> FlowResult<SubmissionReceipt> {
        let assignment_id = self.assignment.id;
        match self.state {
            SubmissionState::NotSubmitted => {}
            SubmissionState::Overdue => return Err(FlowError::Overdue { assignment_id }),
            state => {
                return Err(FlowError::InvalidTransition {
                    state,
                    action: "submit",
                })
            }
        }
        if self.assignment.is_past_due(now) {
            self.state = SubmissionState::Overdue;
            return Err(FlowError::Overdue { assignment_id });
        }
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(EducError::Validation("the answer is empty".into()).into());
        }
        if self.assignment.public_key.trim().is_empty() {
            return Err(CryptoError::Encryption(format!(
                "assignment {assignment_id} has no public key"
            ))
            .into());
        }

        self.state = SubmissionState::Submitting;
        match self.seal_and_post(answer).await {
            Ok(receipt) => {
                self.state = SubmissionState::Submitted;
                self.receipt = Some(receipt.clone());
                info!(
                    assignment_id,
                    submission_id = receipt.submission_id,
                    "submission accepted"
                );
                Ok(receipt)
            }
            Err(e) => {
                self.state = SubmissionState::NotSubmitted;
                warn!(assignment_id, error = %e, "submission rolled back");
                Err(e)
            }
        }
    }

    async fn seal_and_post(&self, answer: &str) -> FlowResult<SubmissionReceipt> {
        let identity = hash_identity(&self.session.email);
        let plaintext = answer.to_string();
        let public_key = self.assignment.public_key.clone();
        let hash = identity.clone();
        let mode = self.mode;

        let (encrypted_content, used) = run_blocking("encrypt submission", None, move || {
            seal_submission(&plaintext, &hash, &public_key, mode)
        })
        .await?;
        debug!(
            assignment_id = self.assignment.id,
            mode = %used,
            ciphertext_len = encrypted_content.len(),
            identity = %identity,
            "answer sealed"
        );

        let receipt = self
            .backend
            .create(&NewSubmission {
                assignment_id: self.assignment.id,
                encrypted_content,
                student_id_hash: identity.to_string(),
                student_email: self.session.email.clone(),
            })
            .await?;
        Ok(receipt)
    }

    /// Re-read the history to observe the professor's grade.
    pub async fn refresh(&mut self) -> FlowResult<SubmissionState> {
        if self.state == SubmissionState::Submitting {
            return Ok(self.state);
        }
        let history = self.backend.history(&self.session.email).await?;
        if let Some(row) = history.iter().find(|s| s.is_for(&self.assignment)) {
            let next = if row.status == SubmissionStatus::Graded {
                SubmissionState::Graded
            } else {
                SubmissionState::Submitted
            };
            if next != self.state {
                debug!(assignment_id = self.assignment.id, from = %self.state, to = %next, "state observed");
                self.state = next;
            }
        }
        Ok(self.state)
    }
}
