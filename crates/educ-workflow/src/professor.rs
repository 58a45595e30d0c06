//! Professor side: key generation, private key handoff, assignment creation

use std::time::Duration;

use chrono::{DateTime, Utc};
use educ_backend::{AssignmentRepository, Backend, CourseRepository};
use educ_core::types::{Course, CreatedAssignment, NewAssignment};
use educ_core::{EducError, Role, Session};
use educ_crypto::generate_key_pair;
use educ_secrets::{HandoffReceipt, KeyHandoff};
use tracing::{info, warn};

use crate::blocking::run_blocking;
use crate::error::{FlowError, FlowResult};

/// Assignment fields entered by the professor.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentDraft {
    pub course_id: i64,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
}

/// A key pair whose private half has been handed off.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// `PUBLIC KEY` envelope
    pub public_key: String,
    /// SHA-256 of the SPKI DER, 64 hex chars
    pub fingerprint: String,
    pub handoff: HandoffReceipt,
}

impl GeneratedKey {
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..self.fingerprint.len().min(16)]
    }
}

#[derive(Debug, Clone)]
pub struct CreatedWithKey {
    pub created: CreatedAssignment,
    pub key: GeneratedKey,
}

/// Generate an RSA-2048 pair and deliver the private envelope through
/// `handoff`. The private key is dropped once delivered.
pub async fn generate_and_handoff(
    label: &str,
    handoff: &dyn KeyHandoff,
    keygen_timeout: Option<Duration>,
) -> FlowResult<GeneratedKey> {
    let pair = run_blocking("key generation", keygen_timeout, generate_key_pair).await?;
    let public_key = pair.public_envelope()?;
    let fingerprint = pair.fingerprint()?;
    let private = pair.private_envelope()?;
    drop(pair);

    let label = format!("{label}-{}", &fingerprint[..16]);
    let receipt = handoff
        .deliver(&label, &private)
        .map_err(|e| FlowError::Handoff(format!("{e:#}")))?;
    info!(fingerprint = %fingerprint, method = %receipt.method, "private key handed off");

    Ok(GeneratedKey {
        public_key,
        fingerprint,
        handoff: receipt,
    })
}

/// Courses the professor may attach an assignment to.
pub async fn courses(backend: &dyn Backend, session: &Session) -> FlowResult<Vec<Course>> {
    session.require_role(Role::Professor)?;
    Ok(backend.courses_for_professor(&session.email).await?)
}

/// Create an assignment: key pair, then handoff, then upload of the public
/// key with the assignment.
///
/// A failed handoff aborts before anything reaches the backend. The POST
/// is issued once.
pub async fn create_assignment(
    backend: &dyn Backend,
    session: &Session,
    draft: &AssignmentDraft,
    handoff: &dyn KeyHandoff,
    keygen_timeout: Option<Duration>,
    now: DateTime<Utc>,
) -> FlowResult<CreatedWithKey> {
    session.require_role(Role::Professor)?;
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(EducError::Validation("the assignment title is empty".into()).into());
    }
    if draft.due_date <= now {
        return Err(EducError::Validation(format!(
            "due date {} is not in the future",
            draft.due_date.to_rfc3339()
        ))
        .into());
    }

    let label = key_label(draft.course_id, title);
    let key = generate_and_handoff(&label, handoff, keygen_timeout).await?;

    let created = backend
        .publish(&NewAssignment {
            title: title.to_string(),
            description: draft.description.trim().to_string(),
            course_id: draft.course_id,
            due_date: draft.due_date,
            public_key: key.public_key.clone(),
            professor_email: session.email.clone(),
        })
        .await
        .map_err(|e| {
            warn!(
                fingerprint = %key.fingerprint,
                error = %e,
                "assignment not created; the handed-off private key belongs to nothing"
            );
            e
        })?;

    info!(
        assignment_id = created.assignment.id,
        course = %created.assignment.course.code,
        fingerprint = %key.fingerprint,
        "assignment created"
    );
    Ok(CreatedWithKey { created, key })
}

fn key_label(course_id: i64, title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        format!("course{course_id}")
    } else {
        format!("course{course_id}-{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_label() {
        assert_eq!(key_label(4, "TP RSA: partie 2"), "course4-tp-rsa-partie-2");
        assert_eq!(key_label(4, "  !!  "), "course4");
    }
}
